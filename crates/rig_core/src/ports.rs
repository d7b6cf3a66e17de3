//! Capabilities the rig needs from the outside world.
//!
//! The control code only ever talks to these traits; `pi_hardware` backs them
//! with real GPIO and camera handles, [`crate::sim`] backs them with
//! scripted doubles.

use std::time::Duration;

use crate::error::RigResult;
use crate::{DistanceReading, Region};

/// Monotonic microsecond timebase.
pub trait Clock {
    fn now_us(&self) -> u64;

    /// Precise short delay, used for trigger pulse shaping.
    fn delay_us(&self, us: u64);

    fn sleep(&self, duration: Duration);
}

pub trait DigitalOutput {
    fn write(&mut self, high: bool) -> RigResult<()>;
}

pub trait DigitalInput {
    fn is_high(&self) -> bool;
}

/// PWM servo channel driven by pulse width in microseconds.
pub trait ServoOutput {
    fn set_pulse_width_us(&mut self, pulse_us: u32) -> RigResult<()>;
}

pub trait VideoSource {
    type Frame;

    /// `Ok(None)` means the source produced an empty frame.
    fn read_frame(&mut self) -> RigResult<Option<Self::Frame>>;
}

pub trait TargetLocator<F> {
    fn locate(&mut self, frame: &F) -> RigResult<Vec<Region>>;
}

pub trait RangeSensor {
    fn measure_distance(&mut self) -> DistanceReading;
}
