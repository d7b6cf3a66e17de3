use log::warn;

use crate::config::RangingConfig;
use crate::ports::{Clock, DigitalInput, DigitalOutput, RangeSensor};
use crate::{DistanceReading, RangeFault};

/// HC-SR04 style ultrasonic ranger measured by polling the echo line.
///
/// A measurement blocks the calling thread for the whole echo round trip,
/// bounded by `echo_timeout_us` per edge.
pub struct UltrasonicRanger<T, E, C> {
    trigger: T,
    echo: E,
    clock: C,
    config: RangingConfig,
}

impl<T, E, C> UltrasonicRanger<T, E, C>
where
    T: DigitalOutput,
    E: DigitalInput,
    C: Clock,
{
    pub fn new(trigger: T, echo: E, clock: C, config: RangingConfig) -> Self {
        Self {
            trigger,
            echo,
            clock,
            config,
        }
    }

    pub fn measure(&mut self) -> DistanceReading {
        if let Err(e) = self.fire_trigger() {
            warn!("Ultrasonic trigger failed: {}", e);
            return DistanceReading::Invalid(RangeFault::TriggerFailed);
        }

        let timeout = self.config.echo_timeout_us;

        let wait_start = self.clock.now_us();
        let mut pulse_start = wait_start;
        while !self.echo.is_high() {
            pulse_start = self.clock.now_us();
            if pulse_start.saturating_sub(wait_start) > timeout {
                warn!("Echo start timeout after {} us", timeout);
                return DistanceReading::Invalid(RangeFault::EchoStartTimeout);
            }
        }

        let mut pulse_end = pulse_start;
        while self.echo.is_high() {
            pulse_end = self.clock.now_us();
            if pulse_end.saturating_sub(pulse_start) > timeout {
                warn!("Echo end timeout after {} us", timeout);
                return DistanceReading::Invalid(RangeFault::EchoEndTimeout);
            }
        }

        let duration_us = pulse_end as i64 - pulse_start as i64;
        distance_from_pulse(duration_us, &self.config)
    }

    fn fire_trigger(&mut self) -> crate::RigResult<()> {
        self.trigger.write(false)?;
        self.clock.delay_us(self.config.trigger_settle_us);
        self.trigger.write(true)?;
        self.clock.delay_us(self.config.trigger_pulse_us);
        self.trigger.write(false)
    }
}

impl<T, E, C> RangeSensor for UltrasonicRanger<T, E, C>
where
    T: DigitalOutput,
    E: DigitalInput,
    C: Clock,
{
    fn measure_distance(&mut self) -> DistanceReading {
        self.measure()
    }
}

/// Converts an echo pulse width into a distance, rejecting anything outside
/// the sensor's usable range.
pub fn distance_from_pulse(duration_us: i64, config: &RangingConfig) -> DistanceReading {
    if duration_us < 0 {
        warn!("Echo pulse has negative width ({} us)", duration_us);
        return DistanceReading::Invalid(RangeFault::NegativePulse);
    }

    let duration_s = duration_us as f64 / 1_000_000.0;
    let distance_cm = duration_s * config.speed_of_sound_cm_per_s / 2.0;

    if !(0.0..=config.max_range_cm).contains(&distance_cm) {
        warn!(
            "Distance {:.1} cm outside 0-{} cm, discarding",
            distance_cm, config.max_range_cm
        );
        return DistanceReading::Invalid(RangeFault::OutOfRange { distance_cm });
    }

    DistanceReading::Valid { distance_cm }
}
