use crate::config::{CameraConfig, TrackingConfig};
use crate::error::RigResult;
use crate::ports::ServoOutput;
use crate::{ActuatorState, TargetPoint};

pub struct PanTiltServos<S> {
    pub pan: S,
    pub tilt: S,
}

impl<S: ServoOutput> PanTiltServos<S> {
    pub fn new(pan: S, tilt: S) -> Self {
        Self { pan, tilt }
    }

    /// Drives both servos to `state`, as done once at startup.
    pub fn apply(&mut self, state: ActuatorState) -> RigResult<()> {
        self.pan.set_pulse_width_us(state.pan_command as u32)?;
        self.tilt.set_pulse_width_us(state.tilt_command as u32)
    }
}

/// Result of one controller step: the new commands and which axes were
/// recomputed (and therefore need to be sent to their servo).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisUpdate {
    pub state: ActuatorState,
    pub pan_recomputed: bool,
    pub tilt_recomputed: bool,
}

/// Fixed-gain proportional pan/tilt controller with a dead zone around the
/// frame centre and hard saturation at the servo limits.
///
/// Pan subtracts the horizontal error while tilt adds the vertical one; that
/// matches how the camera is mounted on the servos and must be re-checked if
/// either servo is flipped.
#[derive(Debug, Clone)]
pub struct PanTiltController {
    kp_pan: f64,
    kp_tilt: f64,
    dead_zone_px: i32,
    min_cmd: f64,
    max_cmd: f64,
    center_x: i32,
    center_y: i32,
}

impl PanTiltController {
    pub fn new(tracking: &TrackingConfig, camera: &CameraConfig) -> Self {
        let (center_x, center_y) = camera.center();
        Self {
            kp_pan: tracking.kp_pan,
            kp_tilt: tracking.kp_tilt,
            dead_zone_px: tracking.dead_zone_px.min(i32::MAX as u32) as i32,
            min_cmd: tracking.min_cmd,
            max_cmd: tracking.max_cmd,
            center_x,
            center_y,
        }
    }

    pub fn compute(&self, current: ActuatorState, target: TargetPoint) -> AxisUpdate {
        let (x, y) = match target {
            TargetPoint::Found { x, y } => (x, y),
            TargetPoint::NotFound => {
                return AxisUpdate {
                    state: current,
                    pan_recomputed: false,
                    tilt_recomputed: false,
                }
            }
        };

        let error_x = x - self.center_x;
        let error_y = y - self.center_y;
        let mut state = current;

        let pan_recomputed = error_x.abs() > self.dead_zone_px;
        if pan_recomputed {
            let pan = current.pan_command - self.kp_pan * error_x as f64;
            state.pan_command = pan.clamp(self.min_cmd, self.max_cmd);
        }

        let tilt_recomputed = error_y.abs() > self.dead_zone_px;
        if tilt_recomputed {
            let tilt = current.tilt_command + self.kp_tilt * error_y as f64;
            state.tilt_command = tilt.clamp(self.min_cmd, self.max_cmd);
        }

        AxisUpdate {
            state,
            pan_recomputed,
            tilt_recomputed,
        }
    }

    /// Computes the next commands and sends only the recomputed axes.
    pub fn update<S: ServoOutput>(
        &self,
        current: ActuatorState,
        target: TargetPoint,
        servos: &mut PanTiltServos<S>,
    ) -> RigResult<AxisUpdate> {
        let update = self.compute(current, target);
        if update.pan_recomputed {
            servos
                .pan
                .set_pulse_width_us(update.state.pan_command as u32)?;
        }
        if update.tilt_recomputed {
            servos
                .tilt
                .set_pulse_width_us(update.state.tilt_command as u32)?;
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingServo;

    fn controller() -> PanTiltController {
        PanTiltController::new(&TrackingConfig::default(), &CameraConfig::default())
    }

    fn at(x: i32, y: i32) -> TargetPoint {
        TargetPoint::Found { x, y }
    }

    #[test]
    fn holds_position_without_target() {
        let c = controller();
        for state in [
            ActuatorState::centered(1500.0),
            ActuatorState {
                pan_command: 1000.0,
                tilt_command: 1873.25,
            },
        ] {
            let update = c.compute(state, TargetPoint::NotFound);
            assert_eq!(update.state, state);
            assert!(!update.pan_recomputed && !update.tilt_recomputed);
        }
    }

    #[test]
    fn pan_moves_against_horizontal_error() {
        // 1500 - 0.005 * 100
        let update = controller().compute(ActuatorState::centered(1500.0), at(420, 240));
        assert!((update.state.pan_command - 1499.5).abs() < 1e-9);
        assert_eq!(update.state.tilt_command, 1500.0);
        assert!(update.pan_recomputed);
        assert!(!update.tilt_recomputed);
    }

    #[test]
    fn tilt_moves_with_vertical_error() {
        let update = controller().compute(ActuatorState::centered(1500.0), at(320, 340));
        assert!((update.state.tilt_command - 1500.5).abs() < 1e-9);
        assert_eq!(update.state.pan_command, 1500.0);
    }

    #[test]
    fn dead_zone_leaves_axis_untouched() {
        let c = controller();
        let state = ActuatorState {
            pan_command: 1234.5,
            tilt_command: 1600.0,
        };
        for dx in -15..=15 {
            let update = c.compute(state, at(320 + dx, 240 + dx));
            assert_eq!(update.state.pan_command, 1234.5);
            assert_eq!(update.state.tilt_command, 1600.0);
            assert!(!update.pan_recomputed);
        }
        assert!(c.compute(state, at(336, 240)).pan_recomputed);
    }

    #[test]
    fn pan_stays_pinned_at_lower_limit() {
        let c = controller();
        let mut state = ActuatorState {
            pan_command: 1000.0,
            tilt_command: 1500.0,
        };
        for _ in 0..500 {
            state = c.compute(state, at(500, 240)).state;
            assert_eq!(state.pan_command, 1000.0);
        }
    }

    #[test]
    fn commands_never_leave_range() {
        let tracking = TrackingConfig {
            kp_pan: 3.0,
            kp_tilt: 3.0,
            ..TrackingConfig::default()
        };
        let c = PanTiltController::new(&tracking, &CameraConfig::default());
        let mut state = ActuatorState::centered(1500.0);
        let targets = [(0, 0), (639, 479), (0, 479), (639, 0), (330, 250), (100, 400)];
        for (i, (x, y)) in targets.iter().cycle().take(200).enumerate() {
            state = c.compute(state, at(*x, *y)).state;
            assert!(
                (1000.0..=2000.0).contains(&state.pan_command),
                "pan out of range at step {}",
                i
            );
            assert!((1000.0..=2000.0).contains(&state.tilt_command));
        }
    }

    #[test]
    fn update_emits_only_recomputed_axes() {
        let c = controller();
        let pan = RecordingServo::new();
        let tilt = RecordingServo::new();
        let mut servos = PanTiltServos::new(pan.clone(), tilt.clone());

        let update = c
            .update(ActuatorState::centered(1500.0), at(420, 245), &mut servos)
            .unwrap();

        assert_eq!(pan.pulses(), vec![update.state.pan_command as u32]);
        assert_eq!(pan.pulses(), vec![1499]);
        assert!(tilt.pulses().is_empty());

        c.update(update.state, TargetPoint::NotFound, &mut servos)
            .unwrap();
        assert_eq!(pan.pulses().len(), 1);
        assert!(tilt.pulses().is_empty());
    }

    #[test]
    fn servo_fault_is_propagated() {
        let c = controller();
        let pan = RecordingServo::new();
        pan.set_failing(true);
        let mut servos = PanTiltServos::new(pan, RecordingServo::new());
        assert!(c
            .update(ActuatorState::centered(1500.0), at(0, 240), &mut servos)
            .is_err());
    }
}
