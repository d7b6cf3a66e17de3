//! Simulated ports for tests and offline replay.
//!
//! Everything here runs on a virtual microsecond clock: sleeps and delays
//! advance it instantly, and every `now_us` read costs one tick so polling
//! loops make progress.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{RigError, RigResult};
use crate::ports::{
    Clock, DigitalInput, DigitalOutput, RangeSensor, ServoOutput, TargetLocator, VideoSource,
};
use crate::{DistanceReading, Region};

#[derive(Clone)]
pub struct SimClock {
    now: Rc<Cell<u64>>,
    poll_cost_us: u64,
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::with_poll_cost(1)
    }

    pub fn with_poll_cost(poll_cost_us: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            poll_cost_us,
            sleeps: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Current virtual time without advancing it.
    pub fn peek_us(&self) -> u64 {
        self.now.get()
    }

    pub fn advance_us(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }

    /// Every `sleep` call made so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn clear_sleeps(&self) {
        self.sleeps.borrow_mut().clear();
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + self.poll_cost_us);
        t
    }

    fn delay_us(&self, us: u64) {
        self.advance_us(us);
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance_us(duration.as_micros() as u64);
    }
}

/// How the simulated sensor answers one ping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EchoScript {
    Pulse { delay_us: u64, width_us: u64 },
    Silent,
    StuckHigh,
}

impl EchoScript {
    /// Echo for an obstacle at `distance_cm`, assuming 34300 cm/s.
    pub fn at_distance(distance_cm: f64) -> Self {
        let width_us = (distance_cm * 2.0 / 34_300.0 * 1_000_000.0).round() as u64;
        EchoScript::Pulse {
            delay_us: 250,
            width_us,
        }
    }
}

struct SonarState {
    clock: SimClock,
    script: RefCell<VecDeque<EchoScript>>,
    active: Cell<Option<(u64, EchoScript)>>,
    trigger_high_since: Cell<Option<u64>>,
    last_trigger_width: Cell<Option<u64>>,
    pings: Cell<u32>,
}

/// Ultrasonic sensor double. Each falling trigger edge starts the next
/// scripted echo; an exhausted script answers with silence.
#[derive(Clone)]
pub struct SimSonar {
    state: Rc<SonarState>,
}

impl SimSonar {
    pub fn new(clock: SimClock, script: Vec<EchoScript>) -> Self {
        Self {
            state: Rc::new(SonarState {
                clock,
                script: RefCell::new(script.into()),
                active: Cell::new(None),
                trigger_high_since: Cell::new(None),
                last_trigger_width: Cell::new(None),
                pings: Cell::new(0),
            }),
        }
    }

    pub fn trigger(&self) -> SimTrigger {
        SimTrigger {
            state: Rc::clone(&self.state),
        }
    }

    pub fn echo(&self) -> SimEcho {
        SimEcho {
            state: Rc::clone(&self.state),
        }
    }

    pub fn push(&self, echo: EchoScript) {
        self.state.script.borrow_mut().push_back(echo);
    }

    pub fn pings(&self) -> u32 {
        self.state.pings.get()
    }

    pub fn last_trigger_width_us(&self) -> Option<u64> {
        self.state.last_trigger_width.get()
    }
}

pub struct SimTrigger {
    state: Rc<SonarState>,
}

impl DigitalOutput for SimTrigger {
    fn write(&mut self, high: bool) -> RigResult<()> {
        let now = self.state.clock.peek_us();
        if high {
            if self.state.trigger_high_since.get().is_none() {
                self.state.trigger_high_since.set(Some(now));
            }
        } else if let Some(since) = self.state.trigger_high_since.take() {
            self.state.last_trigger_width.set(Some(now - since));
            let echo = self
                .state
                .script
                .borrow_mut()
                .pop_front()
                .unwrap_or(EchoScript::Silent);
            self.state.active.set(Some((now, echo)));
            self.state.pings.set(self.state.pings.get() + 1);
        }
        Ok(())
    }
}

pub struct SimEcho {
    state: Rc<SonarState>,
}

impl DigitalInput for SimEcho {
    fn is_high(&self) -> bool {
        let now = self.state.clock.peek_us();
        match self.state.active.get() {
            Some((fired, EchoScript::Pulse { delay_us, width_us })) => {
                let rise = fired + delay_us;
                now >= rise && now < rise + width_us
            }
            Some((fired, EchoScript::StuckHigh)) => now >= fired,
            Some((_, EchoScript::Silent)) | None => false,
        }
    }
}

/// Digital output that remembers every level written to it.
#[derive(Clone, Default)]
pub struct RecordingPin {
    writes: Rc<RefCell<Vec<bool>>>,
}

impl RecordingPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<bool> {
        self.writes.borrow().clone()
    }

    pub fn last(&self) -> Option<bool> {
        self.writes.borrow().last().copied()
    }
}

impl DigitalOutput for RecordingPin {
    fn write(&mut self, high: bool) -> RigResult<()> {
        self.writes.borrow_mut().push(high);
        Ok(())
    }
}

/// Servo double that remembers every pulse width, and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingServo {
    pulses: Rc<RefCell<Vec<u32>>>,
    fail: Rc<Cell<bool>>,
}

impl RecordingServo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pulses(&self) -> Vec<u32> {
        self.pulses.borrow().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.set(fail);
    }
}

impl ServoOutput for RecordingServo {
    fn set_pulse_width_us(&mut self, pulse_us: u32) -> RigResult<()> {
        if self.fail.get() {
            return Err(RigError::hardware("simulated servo fault"));
        }
        self.pulses.borrow_mut().push(pulse_us);
        Ok(())
    }
}

/// A frame whose detections are already known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimFrame {
    pub regions: Vec<Region>,
}

impl SimFrame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_face(region: Region) -> Self {
        Self {
            regions: vec![region],
        }
    }
}

/// Plays back a fixed list of frames, then reports an empty frame.
pub struct ScriptedVideo {
    frames: VecDeque<SimFrame>,
}

impl ScriptedVideo {
    pub fn new(frames: impl IntoIterator<Item = SimFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl VideoSource for ScriptedVideo {
    type Frame = SimFrame;

    fn read_frame(&mut self) -> RigResult<Option<SimFrame>> {
        Ok(self.frames.pop_front())
    }
}

/// Returns the regions baked into each [`SimFrame`].
#[derive(Clone, Copy, Default)]
pub struct PassthroughLocator;

impl TargetLocator<SimFrame> for PassthroughLocator {
    fn locate(&mut self, frame: &SimFrame) -> RigResult<Vec<Region>> {
        Ok(frame.regions.clone())
    }
}

/// Range sensor that replays canned readings, then reports start timeouts.
pub struct ScriptedRanges {
    readings: VecDeque<DistanceReading>,
    calls: Rc<Cell<u32>>,
}

impl ScriptedRanges {
    pub fn new(readings: impl IntoIterator<Item = DistanceReading>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Shared counter of `measure_distance` calls.
    pub fn call_counter(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.calls)
    }
}

impl RangeSensor for ScriptedRanges {
    fn measure_distance(&mut self) -> DistanceReading {
        self.calls.set(self.calls.get() + 1);
        self.readings
            .pop_front()
            .unwrap_or(DistanceReading::Invalid(crate::RangeFault::EchoStartTimeout))
    }
}
