use std::path::Path;
use std::sync::{Arc, Mutex};

use log::info;
use serde::Serialize;

use crate::error::{RigError, RigResult};

/// One control-loop iteration, flattened for CSV export.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CycleRecord {
    pub cycle_id: u64,
    pub elapsed_us: u64,
    pub target_found: bool,
    pub target_x: Option<i32>,
    pub target_y: Option<i32>,
    pub pan_command: f64,
    pub tilt_command: f64,
    pub pan_recomputed: bool,
    pub tilt_recomputed: bool,
    pub distance_cm: Option<f64>,
    pub range_fault: Option<&'static str>,
    pub led_on: bool,
    pub cycle_time_us: u64,
}

/// Cloneable recorder; clones share the same buffer.
#[derive(Clone, Default)]
pub struct CycleRecorder {
    records: Arc<Mutex<Vec<CycleRecord>>>,
}

impl CycleRecorder {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::with_capacity(10_000))),
        }
    }

    pub fn record(&self, record: CycleRecord) {
        if let Ok(mut data) = self.records.lock() {
            data.push(record);
        }
    }

    pub fn get_results(&self) -> Vec<CycleRecord> {
        self.records
            .lock()
            .map(|data| data.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|data| data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save_to_csv(&self, path: impl AsRef<Path>) -> RigResult<()> {
        let path = path.as_ref();
        let data = self.records.lock().map_err(|_| RigError::RecorderPoisoned)?;
        let mut wtr = csv::Writer::from_path(path)?;
        for record in data.iter() {
            wtr.serialize(record)?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        info!("Saved {} cycle records to {}", data.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cycle_id: u64, distance_cm: Option<f64>) -> CycleRecord {
        CycleRecord {
            cycle_id,
            elapsed_us: cycle_id * 100_000,
            target_found: true,
            target_x: Some(400),
            target_y: Some(240),
            pan_command: 1499.6,
            tilt_command: 1500.0,
            pan_recomputed: true,
            tilt_recomputed: false,
            distance_cm,
            range_fault: distance_cm.map_or(Some("echo_start_timeout"), |_| None),
            led_on: distance_cm.is_some_and(|d| d < 40.0),
            cycle_time_us: 51_200,
        }
    }

    #[test]
    fn clones_share_records() {
        let recorder = CycleRecorder::new();
        let handle = recorder.clone();
        handle.record(record(0, Some(20.0)));
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.get_results()[0].cycle_id, 0);
    }

    #[test]
    fn writes_header_and_rows() {
        let recorder = CycleRecorder::new();
        recorder.record(record(0, Some(20.0)));
        recorder.record(record(1, None));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycles.csv");
        recorder.save_to_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("cycle_id,elapsed_us,target_found"));
        assert!(lines[1].contains(",20.0,,true,"));
        assert!(lines[2].contains("echo_start_timeout"));
    }
}
