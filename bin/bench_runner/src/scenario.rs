use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rig_core::config::RigConfig;
use rig_core::diagnostics::DiagnosticsSnapshot;
use rig_core::sim::{
    EchoScript, PassthroughLocator, RecordingPin, RecordingServo, ScriptedVideo, SimClock,
    SimFrame, SimSonar,
};
use rig_core::{
    ControlLoop, CycleRecorder, LoopSummary, PanTiltServos, Region, RigResult, SharedDiagnostics,
    UltrasonicRanger,
};

pub struct ReplayOutcome {
    pub summary: LoopSummary,
    pub recorder: CycleRecorder,
    pub diagnostics: DiagnosticsSnapshot,
    pub virtual_elapsed_us: u64,
}

/// A face wandering on a Lissajous path, dropping out every 9th frame and
/// sharing the frame with a smaller face every 13th.
pub fn frames(cycles: usize, config: &RigConfig) -> Vec<SimFrame> {
    let (cx, cy) = config.camera.center();
    (0..cycles)
        .map(|i| {
            if i % 9 == 8 {
                return SimFrame::empty();
            }
            let t = i as f64;
            let x = cx + (cx as f64 * 0.8 * (t * 0.07).sin()) as i32;
            let y = cy + (cy as f64 * 0.6 * (t * 0.05).sin()) as i32;
            let mut frame = SimFrame::with_face(Region::new(x - 60, y - 60, 120, 120));
            if i % 13 == 0 {
                frame.regions.insert(0, Region::new(20, 20, 50, 50));
            }
            frame
        })
        .collect()
}

/// An obstacle drifting between 10 and 150 cm, with the occasional lost or
/// spurious echo.
pub fn echoes(cycles: usize) -> Vec<EchoScript> {
    (0..cycles)
        .map(|i| match i {
            i if i % 17 == 16 => EchoScript::Silent,
            i if i % 29 == 28 => EchoScript::at_distance(450.0),
            i => EchoScript::at_distance(80.0 + 70.0 * (i as f64 * 0.03).sin()),
        })
        .collect()
}

/// Runs the real control loop over the scenario on a virtual clock.
pub fn run_replay(config: &RigConfig, cycles: usize) -> RigResult<ReplayOutcome> {
    let clock = SimClock::new();
    let sonar = SimSonar::new(clock.clone(), echoes(cycles));
    let ranger = UltrasonicRanger::new(
        sonar.trigger(),
        sonar.echo(),
        clock.clone(),
        config.ranging.clone(),
    );
    let diagnostics = Arc::new(SharedDiagnostics::default());
    let recorder = CycleRecorder::new();

    let mut control = ControlLoop::new(
        config,
        ScriptedVideo::new(frames(cycles, config)),
        PassthroughLocator,
        PanTiltServos::new(RecordingServo::new(), RecordingServo::new()),
        ranger,
        RecordingPin::new(),
        clock.clone(),
    )
    .with_diagnostics(Arc::clone(&diagnostics))
    .with_recorder(recorder.clone());

    let start = clock.peek_us();
    let summary = control.run(&AtomicBool::new(false))?;

    Ok(ReplayOutcome {
        summary,
        recorder,
        diagnostics: diagnostics.snapshot(),
        virtual_elapsed_us: clock.peek_us() - start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_core::LoopExit;

    #[test]
    fn replay_runs_every_frame() {
        let config = RigConfig::default();
        let outcome = run_replay(&config, 60).unwrap();

        assert_eq!(outcome.summary.exit, LoopExit::VideoEnded);
        assert_eq!(outcome.summary.cycles, 60);
        assert_eq!(outcome.recorder.len(), 60);
        assert_eq!(outcome.diagnostics.frames, 60);
        // frames 8, 17, 26, 35, 44, 53 carry no face
        assert_eq!(outcome.diagnostics.targets_found, 54);
        // cycles 16, 33, 50 are silent; 28 and 57 land beyond max range
        assert_eq!(outcome.diagnostics.echo_timeouts, 3);
        assert_eq!(outcome.diagnostics.out_of_range, 2);
    }

    #[test]
    fn replay_keeps_commands_in_range() {
        let config = RigConfig::default();
        let outcome = run_replay(&config, 300).unwrap();
        for record in outcome.recorder.get_results() {
            assert!((1000.0..=2000.0).contains(&record.pan_command));
            assert!((1000.0..=2000.0).contains(&record.tilt_command));
        }
    }
}
