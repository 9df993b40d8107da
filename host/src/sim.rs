//! A seeded stand-in for the robot's body and its surroundings.
//!
//! The world is reduced to one number: free distance along the current
//! heading. Driving forward eats into it, reversing adds to it, and every turn
//! re-rolls it. How likely a turn lands on open floor depends on how close the
//! turn is to the arena's ideal escape angle, so maneuver geometry matters to
//! fitness the way it does on a real floor.

use crate::emitter::{EmitterHandle, Pulse};
use evobot_core::{
    Clock, Cue, Motion, MotionSensor, Motors, RangeSensor, Reading, SeededRng, SignalPattern,
    SignalSink,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub sensor_error_rate: f32,
    pub noise_mm: u16,
    pub max_range_mm: u16,
    pub open_min_mm: u16,
    pub open_max_mm: u16,
    pub blocked_min_mm: u16,
    pub blocked_max_mm: u16,
    /// Turn duration that most reliably finds open floor.
    pub ideal_turn_ms: u32,
    /// Chance of open floor after a turn far from the ideal.
    pub base_open_probability: f32,
    /// Chance per poll that someone walks past a sleeping robot.
    pub motion_probability: f32,
    /// Every this many ticks the robot is picked up and set down (0 = never).
    pub idle_every_ticks: u32,
    pub idle_gap_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sensor_error_rate: 0.01,
            noise_mm: 15,
            max_range_mm: 4_000,
            open_min_mm: 450,
            open_max_mm: 3_000,
            blocked_min_mm: 60,
            blocked_max_mm: 260,
            ideal_turn_ms: 700,
            base_open_probability: 0.25,
            motion_probability: 0.02,
            idle_every_ticks: 0,
            idle_gap_ms: 35_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    pub readings: u64,
    pub sensor_errors: u64,
    pub drives: u64,
    pub turns: u64,
    pub bumps: u64,
    pub signals: u64,
    pub idle_gaps: u64,
}

#[derive(Debug)]
pub struct SimBody {
    config: SimConfig,
    rng: SeededRng,
    now_ms: u64,
    ahead_mm: u32,
    emitter: Option<EmitterHandle>,
    stats: SimStats,
}

impl SimBody {
    /// Without an emitter, signals block the clock for their full duration.
    pub fn new(config: SimConfig, seed: u32, emitter: Option<EmitterHandle>) -> Self {
        // Keep the world stream independent of the brain's stream for the same seed.
        let mut rng = SeededRng::new(seed ^ 0x5A17_B0D1);
        let ahead_mm = rng.next_range(config.open_min_mm as i32, config.open_max_mm as i32) as u32;
        Self {
            config,
            rng,
            now_ms: 0,
            ahead_mm,
            emitter,
            stats: SimStats::default(),
        }
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    pub fn ahead_mm(&self) -> u32 {
        self.ahead_mm
    }

    /// Time passes with nothing moving.
    pub fn idle(&mut self, ms: u64) {
        self.now_ms += ms;
        self.stats.idle_gaps += 1;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn open_probability(&self, turn_ms: u32) -> f32 {
        let ideal = self.config.ideal_turn_ms.max(1) as f32;
        let miss = (turn_ms as f32 - ideal).abs() / ideal;
        let closeness = (1.0 - miss).clamp(0.0, 1.0);
        let base = self.config.base_open_probability.clamp(0.0, 1.0);
        base + (1.0 - base) * closeness
    }

    fn reroll_heading(&mut self, turn_ms: u32) {
        let open = self.open_probability(turn_ms);
        let cfg = &self.config;
        let (lo, hi) = if self.rng.chance(open) {
            (cfg.open_min_mm, cfg.open_max_mm)
        } else {
            (cfg.blocked_min_mm, cfg.blocked_max_mm)
        };
        self.ahead_mm = self.rng.next_range(lo as i32, hi as i32) as u32;
    }
}

fn travel_mm(speed: u8, duration_ms: u32) -> u32 {
    speed as u32 * duration_ms / 1_000
}

impl RangeSensor for SimBody {
    fn read_distance(&mut self) -> Reading {
        self.stats.readings += 1;
        if self.rng.chance(self.config.sensor_error_rate) {
            self.stats.sensor_errors += 1;
            return Reading::Error;
        }
        let noise = self.config.noise_mm as i32;
        let jitter = self.rng.next_range(-noise, noise + 1) as i64;
        let mm = (self.ahead_mm as i64 + jitter).clamp(0, self.config.max_range_mm as i64);
        if mm >= self.config.max_range_mm as i64 {
            // No echo within range.
            return Reading::Error;
        }
        Reading::Distance(mm as u16)
    }
}

impl Motors for SimBody {
    fn drive(&mut self, motion: Motion, speed: u8, duration_ms: u32) {
        self.stats.drives += 1;
        self.now_ms += duration_ms as u64;
        let mm = travel_mm(speed, duration_ms);
        match motion {
            Motion::Forward => {
                if mm >= self.ahead_mm {
                    self.stats.bumps += 1;
                }
                self.ahead_mm = self.ahead_mm.saturating_sub(mm).max(20);
            }
            Motion::Backward => {
                self.ahead_mm = (self.ahead_mm + mm).min(self.config.max_range_mm as u32);
            }
            Motion::TurnLeft | Motion::TurnRight => {
                self.stats.turns += 1;
                self.reroll_heading(duration_ms);
            }
        }
    }

    fn stop(&mut self) {}
}

impl Clock for SimBody {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn pause(&mut self, ms: u32) {
        self.now_ms += ms as u64;
    }
}

impl SignalSink for SimBody {
    fn emit(&mut self, pattern: &SignalPattern, cue: Cue, gap_ms: u16) {
        self.stats.signals += 1;
        match &self.emitter {
            Some(emitter) => {
                emitter.send(Pulse {
                    at_ms: self.now_ms,
                    pattern: *pattern,
                    cue,
                    gap_ms,
                });
            }
            None => self.now_ms += pattern.duration_ms(gap_ms) as u64,
        }
    }
}

impl MotionSensor for SimBody {
    fn motion_detected(&mut self) -> bool {
        self.rng.chance(self.config.motion_probability)
    }
}
