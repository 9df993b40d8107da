#![allow(dead_code)]

use std::collections::VecDeque;

use evobot_core::{Clock, Cue, Motion, MotionSensor, Motors, RangeSensor, Reading, SignalPattern, SignalSink};

/// Deterministic body double: replays scripted readings and records every command.
#[derive(Debug)]
pub struct ScriptedBody {
    pub now_ms: u64,
    pub readings: VecDeque<Reading>,
    pub fallback: Reading,
    pub motion: bool,
    pub drives: Vec<(Motion, u8, u32)>,
    pub stops: u32,
    pub emissions: Vec<(SignalPattern, Cue)>,
}

impl ScriptedBody {
    pub fn new(fallback: Reading) -> Self {
        Self {
            now_ms: 0,
            readings: VecDeque::new(),
            fallback,
            motion: false,
            drives: Vec::new(),
            stops: 0,
            emissions: Vec::new(),
        }
    }

    pub fn script(&mut self, mm: u16, count: usize) -> &mut Self {
        for _ in 0..count {
            self.readings.push_back(Reading::Distance(mm));
        }
        self
    }
}

impl RangeSensor for ScriptedBody {
    fn read_distance(&mut self) -> Reading {
        self.readings.pop_front().unwrap_or(self.fallback)
    }
}

impl Motors for ScriptedBody {
    fn drive(&mut self, motion: Motion, speed: u8, duration_ms: u32) {
        self.drives.push((motion, speed, duration_ms));
        self.now_ms += duration_ms as u64;
    }

    fn stop(&mut self) {
        self.stops += 1;
    }
}

impl Clock for ScriptedBody {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn pause(&mut self, ms: u32) {
        self.now_ms += ms as u64;
    }
}

impl SignalSink for ScriptedBody {
    fn emit(&mut self, pattern: &SignalPattern, cue: Cue, gap_ms: u16) {
        self.now_ms += pattern.duration_ms(gap_ms) as u64;
        self.emissions.push((*pattern, cue));
    }
}

impl MotionSensor for ScriptedBody {
    fn motion_detected(&mut self) -> bool {
        self.motion
    }
}
