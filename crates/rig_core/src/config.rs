use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RigError, RigResult};

/// Process-wide rig settings. Every field defaults to the value the rig was
/// tuned with, so an empty file yields a working configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RigConfig {
    pub camera: CameraConfig,
    pub pins: PinConfig,
    pub tracking: TrackingConfig,
    pub ranging: RangingConfig,
    pub alert: AlertConfig,
    pub timing: TimingConfig,
    pub range_test: RangeTestConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub device_index: i32,
    pub cascade_path: PathBuf,
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub min_face_px: i32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            device_index: 0,
            cascade_path: PathBuf::from(
                "/usr/share/opencv4/haarcascades/haarcascade_frontalface_alt.xml",
            ),
            scale_factor: 1.1,
            min_neighbors: 2,
            min_face_px: 30,
        }
    }
}

impl CameraConfig {
    pub fn center(&self) -> (i32, i32) {
        ((self.width / 2) as i32, (self.height / 2) as i32)
    }
}

/// BCM GPIO numbers.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PinConfig {
    pub pan_servo: u8,
    pub tilt_servo: u8,
    pub trigger: u8,
    pub echo: u8,
    pub led: u8,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            pan_servo: 17,
            tilt_servo: 18,
            trigger: 23,
            echo: 24,
            led: 27,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrackingConfig {
    pub kp_pan: f64,
    pub kp_tilt: f64,
    pub dead_zone_px: u32,
    pub min_cmd: f64,
    pub max_cmd: f64,
    pub initial_cmd: f64,
    pub servo_period_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            kp_pan: 0.005,
            kp_tilt: 0.005,
            dead_zone_px: 15,
            min_cmd: 1000.0,
            max_cmd: 2000.0,
            initial_cmd: 1500.0,
            servo_period_ms: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RangingConfig {
    pub trigger_settle_us: u64,
    pub trigger_pulse_us: u64,
    pub echo_timeout_us: u64,
    pub speed_of_sound_cm_per_s: f64,
    pub max_range_cm: f64,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            trigger_settle_us: 2,
            trigger_pulse_us: 10,
            echo_timeout_us: 50_000,
            speed_of_sound_cm_per_s: 34_300.0,
            max_range_cm: 400.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertConfig {
    pub threshold_cm: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { threshold_cm: 40.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub settle_ms: u64,
    pub cadence_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 50,
            cadence_ms: 100,
        }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }
}

/// Settings for the camera-less ultrasonic bring-up loop.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RangeTestConfig {
    pub threshold_cm: f64,
    pub cadence_ms: u64,
}

impl Default for RangeTestConfig {
    fn default() -> Self {
        Self {
            threshold_cm: 45.0,
            cadence_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MetricsConfig {
    pub csv_path: Option<PathBuf>,
}

pub fn load_config(path: impl AsRef<Path>) -> RigResult<RigConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| RigError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config = RigConfig::from_toml_str(&content)?;
    Ok(config)
}

impl RigConfig {
    pub fn from_toml_str(content: &str) -> RigResult<Self> {
        let config: RigConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RigResult<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(RigError::invalid_config("camera frame size must be non-zero"));
        }

        let t = &self.tracking;
        if !t.kp_pan.is_finite() || !t.kp_tilt.is_finite() {
            return Err(RigError::invalid_config("tracking gains must be finite"));
        }
        if !(t.min_cmd.is_finite() && t.max_cmd.is_finite()) || t.min_cmd >= t.max_cmd {
            return Err(RigError::invalid_config(format!(
                "servo command range [{}, {}] is empty",
                t.min_cmd, t.max_cmd
            )));
        }
        if !(t.min_cmd..=t.max_cmd).contains(&t.initial_cmd) {
            return Err(RigError::invalid_config(format!(
                "initial servo command {} outside [{}, {}]",
                t.initial_cmd, t.min_cmd, t.max_cmd
            )));
        }
        if t.servo_period_ms == 0 {
            return Err(RigError::invalid_config("servo period must be non-zero"));
        }

        let r = &self.ranging;
        if !(r.speed_of_sound_cm_per_s.is_finite() && r.speed_of_sound_cm_per_s > 0.0) {
            return Err(RigError::invalid_config("speed of sound must be positive"));
        }
        if !(r.max_range_cm.is_finite() && r.max_range_cm > 0.0) {
            return Err(RigError::invalid_config("max range must be positive"));
        }
        if r.echo_timeout_us == 0 {
            return Err(RigError::invalid_config("echo timeout must be non-zero"));
        }

        if !self.alert.threshold_cm.is_finite() || !self.range_test.threshold_cm.is_finite() {
            return Err(RigError::invalid_config("alert thresholds must be finite"));
        }

        Ok(())
    }
}
