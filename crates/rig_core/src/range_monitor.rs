use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::config::RangeTestConfig;
use crate::control_loop::log_reading;
use crate::diagnostics::SharedDiagnostics;
use crate::error::RigResult;
use crate::ports::{Clock, DigitalOutput, RangeSensor};
use crate::{proximity, DistanceReading};

/// Camera-less bring-up loop: ping, light the LED when something is close,
/// wait, repeat.
pub struct RangeMonitor<R, O, C> {
    ranger: R,
    led: O,
    clock: C,
    threshold_cm: f64,
    cadence: Duration,
    diagnostics: Arc<SharedDiagnostics>,
}

impl<R, O, C> RangeMonitor<R, O, C>
where
    R: RangeSensor,
    O: DigitalOutput,
    C: Clock,
{
    pub fn new(config: &RangeTestConfig, ranger: R, led: O, clock: C) -> Self {
        Self {
            ranger,
            led,
            clock,
            threshold_cm: config.threshold_cm,
            cadence: Duration::from_millis(config.cadence_ms),
            diagnostics: Arc::new(SharedDiagnostics::default()),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<SharedDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn step(&mut self) -> RigResult<(DistanceReading, bool)> {
        let reading = self.ranger.measure_distance();
        self.diagnostics.record_reading(&reading);
        log_reading(&reading);

        let led_on = proximity::decide(reading, self.threshold_cm);
        self.led.write(led_on)?;
        if led_on {
            self.diagnostics.record_alert();
        }
        Ok((reading, led_on))
    }

    /// Runs until `shutdown` is raised; returns the number of pings taken.
    pub fn run(&mut self, shutdown: &AtomicBool) -> RigResult<u64> {
        self.led.write(false)?;
        info!(
            "Range test started, alert below {:.1} cm every {} ms",
            self.threshold_cm,
            self.cadence.as_millis()
        );

        let mut pings = 0u64;
        let result = loop {
            if shutdown.load(Ordering::Relaxed) {
                break Ok(pings);
            }
            if let Err(e) = self.step() {
                break Err(e);
            }
            pings += 1;
            self.clock.sleep(self.cadence);
        };

        if let Err(e) = self.led.write(false) {
            warn!("Could not switch LED off: {}", e);
        }
        result
    }
}
