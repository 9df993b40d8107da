//! Collaborator interfaces to the physical robot.

use serde::{Deserialize, Serialize};

use crate::vocabulary::{Cue, SignalPattern};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reading {
    Distance(u16),
    /// Timeout or out-of-range echo; never fatal.
    Error,
}

impl Reading {
    pub fn distance(self) -> Option<u16> {
        match self {
            Self::Distance(mm) => Some(mm),
            Self::Error => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
}

pub trait RangeSensor {
    fn read_distance(&mut self) -> Reading;
}

pub trait Motors {
    /// Run `motion` at `speed` for `duration_ms`, blocking until done.
    fn drive(&mut self, motion: Motion, speed: u8, duration_ms: u32);

    fn stop(&mut self);
}

pub trait Clock {
    fn now_ms(&self) -> u64;

    fn pause(&mut self, ms: u32);
}

/// Actuator driver for tones and the colour cue. Emission is an ordered pulse train.
pub trait SignalSink {
    fn emit(&mut self, pattern: &SignalPattern, cue: Cue, gap_ms: u16);
}

pub trait MotionSensor {
    fn motion_detected(&mut self) -> bool;
}

pub trait Body: RangeSensor + Motors + Clock + SignalSink + MotionSensor {}

impl<T: RangeSensor + Motors + Clock + SignalSink + MotionSensor> Body for T {}
