use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::RigConfig;
use crate::diagnostics::SharedDiagnostics;
use crate::error::RigResult;
use crate::metrics::{CycleRecord, CycleRecorder};
use crate::ports::{Clock, DigitalOutput, RangeSensor, ServoOutput, TargetLocator, VideoSource};
use crate::proximity;
use crate::targeting::select_target;
use crate::tracking::{PanTiltController, PanTiltServos};
use crate::{ActuatorState, DistanceReading, TargetPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The video source returned an empty frame.
    VideoEnded,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
    pub exit: LoopExit,
}

/// Single-threaded track / range / alert loop.
///
/// Owns the actuator state for its whole lifetime; nothing else mutates it.
pub struct ControlLoop<V, D, S, R, O, C> {
    video: V,
    locator: D,
    servos: PanTiltServos<S>,
    ranger: R,
    led: O,
    clock: C,
    controller: PanTiltController,
    state: ActuatorState,
    settle: Duration,
    cadence: Duration,
    alert_threshold_cm: f64,
    diagnostics: Arc<SharedDiagnostics>,
    recorder: Option<CycleRecorder>,
    cycle_id: u64,
    started_at_us: u64,
}

impl<V, D, S, R, O, C> ControlLoop<V, D, S, R, O, C>
where
    V: VideoSource,
    D: TargetLocator<V::Frame>,
    S: ServoOutput,
    R: RangeSensor,
    O: DigitalOutput,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &RigConfig,
        video: V,
        locator: D,
        servos: PanTiltServos<S>,
        ranger: R,
        led: O,
        clock: C,
    ) -> Self {
        let started_at_us = clock.now_us();
        Self {
            video,
            locator,
            servos,
            ranger,
            led,
            clock,
            controller: PanTiltController::new(&config.tracking, &config.camera),
            state: ActuatorState::centered(config.tracking.initial_cmd),
            settle: config.timing.settle(),
            cadence: config.timing.cadence(),
            alert_threshold_cm: config.alert.threshold_cm,
            diagnostics: Arc::new(SharedDiagnostics::default()),
            recorder: None,
            cycle_id: 0,
            started_at_us,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<SharedDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_recorder(mut self, recorder: CycleRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn diagnostics(&self) -> &Arc<SharedDiagnostics> {
        &self.diagnostics
    }

    /// Centres the servos and switches the LED off.
    pub fn home(&mut self) -> RigResult<()> {
        self.servos.apply(self.state)?;
        self.led.write(false)
    }

    /// Runs one iteration. Returns `Ok(None)` once the video source stops
    /// producing frames.
    pub fn step(&mut self) -> RigResult<Option<CycleRecord>> {
        let cycle_start = self.clock.now_us();

        let frame = match self.video.read_frame()? {
            Some(frame) => frame,
            None => return Ok(None),
        };
        self.diagnostics.record_frame();

        let regions = self.locator.locate(&frame)?;
        let target = select_target(&regions);

        let update = self.controller.update(self.state, target, &mut self.servos)?;
        self.state = update.state;

        if target.is_found() {
            self.diagnostics.record_target();
            debug!(
                "Target {:?} -> pan {:.1}, tilt {:.1}",
                target, self.state.pan_command, self.state.tilt_command
            );
            self.clock.sleep(self.settle);
        }

        let reading = self.ranger.measure_distance();
        self.diagnostics.record_reading(&reading);
        log_reading(&reading);

        let led_on = proximity::decide(reading, self.alert_threshold_cm);
        self.led.write(led_on)?;
        if led_on {
            self.diagnostics.record_alert();
        }
        debug!("LED {}", if led_on { "ON" } else { "OFF" });

        let cycle_time_us = self.clock.now_us().saturating_sub(cycle_start);
        let (target_x, target_y) = match target {
            TargetPoint::Found { x, y } => (Some(x), Some(y)),
            TargetPoint::NotFound => (None, None),
        };
        let record = CycleRecord {
            cycle_id: self.cycle_id,
            elapsed_us: cycle_start.saturating_sub(self.started_at_us),
            target_found: target.is_found(),
            target_x,
            target_y,
            pan_command: self.state.pan_command,
            tilt_command: self.state.tilt_command,
            pan_recomputed: update.pan_recomputed,
            tilt_recomputed: update.tilt_recomputed,
            distance_cm: reading.distance_cm(),
            range_fault: reading.fault().map(|f| f.label()),
            led_on,
            cycle_time_us,
        };
        self.cycle_id += 1;

        self.clock.sleep(self.cadence);
        Ok(Some(record))
    }

    /// Loops until the video source ends or `shutdown` is raised, then
    /// switches the LED off.
    pub fn run(&mut self, shutdown: &AtomicBool) -> RigResult<LoopSummary> {
        self.home()?;
        info!(
            "Control loop started at pan {:.0}, tilt {:.0}",
            self.state.pan_command, self.state.tilt_command
        );

        let result = self.run_cycles(shutdown);
        if let Err(e) = self.led.write(false) {
            warn!("Could not switch LED off: {}", e);
        }

        let summary = result?;
        match summary.exit {
            LoopExit::VideoEnded => warn!("No frame captured, leaving control loop"),
            LoopExit::Shutdown => info!("Shutdown requested, leaving control loop"),
        }
        Ok(summary)
    }

    fn run_cycles(&mut self, shutdown: &AtomicBool) -> RigResult<LoopSummary> {
        let mut cycles = 0u64;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(LoopSummary {
                    cycles,
                    exit: LoopExit::Shutdown,
                });
            }
            match self.step()? {
                Some(record) => {
                    cycles += 1;
                    if let Some(recorder) = &self.recorder {
                        recorder.record(record);
                    }
                }
                None => {
                    return Ok(LoopSummary {
                        cycles,
                        exit: LoopExit::VideoEnded,
                    })
                }
            }
        }
    }
}

pub(crate) fn log_reading(reading: &DistanceReading) {
    match reading {
        DistanceReading::Valid { distance_cm } => debug!("Distance: {:.1} cm", distance_cm),
        DistanceReading::Invalid(fault) => {
            debug!("Distance: out of range / error ({})", fault.label())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{
        PassthroughLocator, RecordingPin, RecordingServo, ScriptedRanges, ScriptedVideo, SimClock,
        SimFrame,
    };
    use crate::error::RigError;
    use crate::{RangeFault, Region};

    type SimLoop =
        ControlLoop<ScriptedVideo, PassthroughLocator, RecordingServo, ScriptedRanges, RecordingPin, SimClock>;

    struct Harness {
        pan: RecordingServo,
        tilt: RecordingServo,
        led: RecordingPin,
        clock: SimClock,
    }

    fn build(frames: Vec<SimFrame>, readings: Vec<DistanceReading>) -> (SimLoop, Harness) {
        let harness = Harness {
            pan: RecordingServo::new(),
            tilt: RecordingServo::new(),
            led: RecordingPin::new(),
            clock: SimClock::with_poll_cost(0),
        };
        let control = ControlLoop::new(
            &RigConfig::default(),
            ScriptedVideo::new(frames),
            PassthroughLocator,
            PanTiltServos::new(harness.pan.clone(), harness.tilt.clone()),
            ScriptedRanges::new(readings),
            harness.led.clone(),
            harness.clock.clone(),
        );
        (control, harness)
    }

    fn face_at(x: i32, y: i32) -> SimFrame {
        SimFrame::with_face(Region::new(x - 50, y - 50, 100, 100))
    }

    #[test]
    fn settle_sleep_only_when_target_found() {
        let (mut control, h) = build(
            vec![face_at(420, 240), SimFrame::empty()],
            vec![DistanceReading::Valid { distance_cm: 100.0 }; 2],
        );

        control.step().unwrap().unwrap();
        assert_eq!(
            h.clock.sleeps(),
            vec![Duration::from_millis(50), Duration::from_millis(100)]
        );

        h.clock.clear_sleeps();
        control.step().unwrap().unwrap();
        assert_eq!(h.clock.sleeps(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn no_target_holds_servos_and_still_ranges() {
        let (mut control, h) = build(
            vec![SimFrame::empty()],
            vec![DistanceReading::Valid { distance_cm: 12.0 }],
        );

        let record = control.step().unwrap().unwrap();
        assert!(!record.target_found);
        assert!(record.led_on);
        assert!(h.pan.pulses().is_empty());
        assert!(h.tilt.pulses().is_empty());
        assert_eq!(control.state(), ActuatorState::centered(1500.0));
        assert_eq!(h.led.writes(), vec![true]);
    }

    #[test]
    fn invalid_reading_turns_led_off() {
        let (mut control, h) = build(
            vec![face_at(320, 240), face_at(320, 240)],
            vec![
                DistanceReading::Valid { distance_cm: 10.0 },
                DistanceReading::Invalid(RangeFault::EchoStartTimeout),
            ],
        );

        control.step().unwrap();
        let record = control.step().unwrap().unwrap();
        assert_eq!(h.led.writes(), vec![true, false]);
        assert_eq!(record.range_fault, Some("echo_start_timeout"));
        assert_eq!(record.distance_cm, None);
    }

    #[test]
    fn run_stops_when_video_ends() {
        let (control, h) = build(
            vec![face_at(600, 400); 3],
            vec![DistanceReading::Valid { distance_cm: 30.0 }; 3],
        );
        let recorder = CycleRecorder::new();
        let mut control = control.with_recorder(recorder.clone());

        let summary = control.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(
            summary,
            LoopSummary {
                cycles: 3,
                exit: LoopExit::VideoEnded
            }
        );
        assert_eq!(recorder.len(), 3);
        // homing pulse plus one per cycle on each axis
        assert_eq!(h.pan.pulses().len(), 4);
        assert_eq!(h.tilt.pulses().len(), 4);
        assert_eq!(h.pan.pulses()[0], 1500);
        assert_eq!(h.led.writes().first(), Some(&false));
        assert_eq!(h.led.last(), Some(false));

        let snap = control.diagnostics().snapshot();
        assert_eq!(snap.frames, 3);
        assert_eq!(snap.targets_found, 3);
        assert_eq!(snap.alerts, 3);
    }

    #[test]
    fn run_honours_shutdown_flag() {
        let (mut control, h) = build(vec![face_at(320, 240); 5], Vec::new());
        let summary = control.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(summary.exit, LoopExit::Shutdown);
        assert_eq!(summary.cycles, 0);
        assert_eq!(h.led.writes(), vec![false, false]);
    }

    #[test]
    fn servo_fault_aborts_step() {
        let (mut control, h) = build(
            vec![face_at(600, 240)],
            vec![DistanceReading::Valid { distance_cm: 10.0 }],
        );
        h.pan.set_failing(true);

        assert!(control.step().is_err());
        assert!(h.led.writes().is_empty());
        assert!(control.run(&AtomicBool::new(false)).is_err());
    }

    struct DeadCamera;

    impl VideoSource for DeadCamera {
        type Frame = SimFrame;

        fn read_frame(&mut self) -> RigResult<Option<SimFrame>> {
            Err(RigError::VideoSource("device unplugged".into()))
        }
    }

    struct BrokenDetector;

    impl TargetLocator<SimFrame> for BrokenDetector {
        fn locate(&mut self, _frame: &SimFrame) -> RigResult<Vec<Region>> {
            Err(RigError::Detector("cascade not loaded".into()))
        }
    }

    #[test]
    fn video_error_is_fatal_and_leaves_led_off() {
        let led = RecordingPin::new();
        let mut control = ControlLoop::new(
            &RigConfig::default(),
            DeadCamera,
            PassthroughLocator,
            PanTiltServos::new(RecordingServo::new(), RecordingServo::new()),
            ScriptedRanges::new(vec![DistanceReading::Valid { distance_cm: 5.0 }]),
            led.clone(),
            SimClock::with_poll_cost(0),
        );

        let err = control.run(&AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, RigError::VideoSource(_)));
        assert_eq!(led.writes(), vec![false, false]);
        assert_eq!(control.diagnostics().snapshot().frames, 0);
    }

    #[test]
    fn detector_error_is_fatal_before_ranging() {
        let led = RecordingPin::new();
        let ranges = ScriptedRanges::new(vec![DistanceReading::Valid { distance_cm: 5.0 }]);
        let calls = ranges.call_counter();
        let mut control = ControlLoop::new(
            &RigConfig::default(),
            ScriptedVideo::new(vec![face_at(320, 240)]),
            BrokenDetector,
            PanTiltServos::new(RecordingServo::new(), RecordingServo::new()),
            ranges,
            led.clone(),
            SimClock::with_poll_cost(0),
        );

        let err = control.run(&AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, RigError::Detector(_)));
        assert_eq!(calls.get(), 0);
        assert_eq!(led.last(), Some(false));
        assert_eq!(control.diagnostics().snapshot().frames, 1);
    }
}
