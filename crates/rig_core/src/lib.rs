pub mod config;
pub mod control_loop;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod proximity;
pub mod range_monitor;
pub mod ranging;
pub mod sim;
pub mod targeting;
pub mod tracking;

pub use config::{load_config, RigConfig};
pub use control_loop::{ControlLoop, LoopExit, LoopSummary};
pub use diagnostics::SharedDiagnostics;
pub use error::{RigError, RigResult};
pub use metrics::{CycleRecord, CycleRecorder};
pub use range_monitor::RangeMonitor;
pub use ranging::UltrasonicRanger;
pub use tracking::{PanTiltController, PanTiltServos};

/// Pulse-width commands currently applied to the two servos, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorState {
    pub pan_command: f64,
    pub tilt_command: f64,
}

impl ActuatorState {
    pub fn centered(command: f64) -> Self {
        Self {
            pan_command: command,
            tilt_command: command,
        }
    }
}

/// Where the tracked face sits in the current frame, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPoint {
    Found { x: i32, y: i32 },
    NotFound,
}

impl TargetPoint {
    pub fn is_found(&self) -> bool {
        matches!(self, TargetPoint::Found { .. })
    }
}

/// Candidate bounding box reported by a target locator, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn centroid(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Why an ultrasonic read produced no usable distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeFault {
    /// The trigger line could not be driven.
    TriggerFailed,
    /// Echo never went high within the timeout.
    EchoStartTimeout,
    /// Echo never went low within the timeout.
    EchoEndTimeout,
    NegativePulse,
    OutOfRange { distance_cm: f64 },
}

impl RangeFault {
    pub fn label(&self) -> &'static str {
        match self {
            RangeFault::TriggerFailed => "trigger_failed",
            RangeFault::EchoStartTimeout => "echo_start_timeout",
            RangeFault::EchoEndTimeout => "echo_end_timeout",
            RangeFault::NegativePulse => "negative_pulse",
            RangeFault::OutOfRange { .. } => "out_of_range",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RangeFault::EchoStartTimeout | RangeFault::EchoEndTimeout
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceReading {
    Valid { distance_cm: f64 },
    Invalid(RangeFault),
}

impl DistanceReading {
    pub fn distance_cm(&self) -> Option<f64> {
        match self {
            DistanceReading::Valid { distance_cm } => Some(*distance_cm),
            DistanceReading::Invalid(_) => None,
        }
    }

    pub fn fault(&self) -> Option<RangeFault> {
        match self {
            DistanceReading::Valid { .. } => None,
            DistanceReading::Invalid(fault) => Some(*fault),
        }
    }
}
