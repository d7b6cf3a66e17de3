use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::{DistanceReading, RangeFault};

/// Running counters shared between the loop and whoever reports on it.
#[derive(Default)]
pub struct SharedDiagnostics {
    pub frames: AtomicU64,
    pub targets_found: AtomicU64,
    pub valid_readings: AtomicU64,
    pub echo_timeouts: AtomicU64,
    pub out_of_range: AtomicU64,
    pub other_faults: AtomicU64,
    pub alerts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub frames: u64,
    pub targets_found: u64,
    pub valid_readings: u64,
    pub echo_timeouts: u64,
    pub out_of_range: u64,
    pub other_faults: u64,
    pub alerts: u64,
}

impl SharedDiagnostics {
    pub fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_target(&self) {
        self.targets_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading(&self, reading: &DistanceReading) {
        let counter = match reading {
            DistanceReading::Valid { .. } => &self.valid_readings,
            DistanceReading::Invalid(fault) if fault.is_timeout() => &self.echo_timeouts,
            DistanceReading::Invalid(RangeFault::OutOfRange { .. }) => &self.out_of_range,
            DistanceReading::Invalid(_) => &self.other_faults,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            targets_found: self.targets_found.load(Ordering::Relaxed),
            valid_readings: self.valid_readings.load(Ordering::Relaxed),
            echo_timeouts: self.echo_timeouts.load(Ordering::Relaxed),
            out_of_range: self.out_of_range.load(Ordering::Relaxed),
            other_faults: self.other_faults.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_are_bucketed_by_fault() {
        let diag = SharedDiagnostics::default();
        diag.record_reading(&DistanceReading::Valid { distance_cm: 12.0 });
        diag.record_reading(&DistanceReading::Invalid(RangeFault::EchoStartTimeout));
        diag.record_reading(&DistanceReading::Invalid(RangeFault::EchoEndTimeout));
        diag.record_reading(&DistanceReading::Invalid(RangeFault::OutOfRange {
            distance_cm: 512.0,
        }));
        diag.record_reading(&DistanceReading::Invalid(RangeFault::TriggerFailed));

        let snap = diag.snapshot();
        assert_eq!(snap.valid_readings, 1);
        assert_eq!(snap.echo_timeouts, 2);
        assert_eq!(snap.out_of_range, 1);
        assert_eq!(snap.other_faults, 1);
        assert_eq!(snap.frames, 0);
    }
}
