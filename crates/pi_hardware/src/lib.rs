//! Raspberry Pi backing for the rig's ports: GPIO, software servo PWM and a
//! microsecond clock via `rppal`, plus the OpenCV camera and cascade face
//! locator when built with the `camera` feature.

pub mod gpio;

#[cfg(feature = "camera")]
pub mod camera;

pub use gpio::{GpioInput, GpioOutput, PiClock, PiRig, SoftServo};

#[cfg(feature = "camera")]
pub use camera::{CameraSource, CascadeLocator};
