//! Bounded memory of obstacle maneuvers and how well they worked.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rng::SeededRng;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TurnDirection {
    Left = 0,
    Right = 1,
}

impl TurnDirection {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub capacity: usize,
    /// Window used when a new sample is folded into an existing entry.
    pub match_tolerance_mm: u16,
    /// Window used when looking up a maneuver for a fresh obstacle.
    pub query_tolerance_mm: u16,
    pub min_uses: u32,
    pub exploit_probability: f32,
    pub prune_min_samples: u32,
    pub prune_cutoff: f32,
    /// Entries idle for more generations than this are compacted away. Zero disables.
    pub stale_after_generations: u32,
    pub save_probability: f32,
    pub success_weight: f32,
    pub speed_weight: f32,
    pub completion_floor_ms: f32,
}

impl StrategyConfig {
    pub fn wheelie() -> Self {
        Self {
            capacity: 20,
            match_tolerance_mm: 50,
            query_tolerance_mm: 100,
            min_uses: 2,
            exploit_probability: 0.80,
            prune_min_samples: 3,
            prune_cutoff: 0.3,
            stale_after_generations: 200,
            save_probability: 0.20,
            success_weight: 0.7,
            speed_weight: 0.3,
            completion_floor_ms: 100.0,
        }
    }

    pub fn speedie() -> Self {
        Self {
            capacity: 25,
            query_tolerance_mm: 80,
            min_uses: 1,
            exploit_probability: 0.85,
            prune_min_samples: 2,
            prune_cutoff: 0.4,
            save_probability: 0.30,
            ..Self::wheelie()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearnedStrategy {
    pub context_distance_mm: u16,
    pub direction: TurnDirection,
    pub backup_ms: u16,
    pub turn_ms: u16,
    pub success_rate: f32,
    pub times_used: u32,
    pub times_succeeded: u32,
    pub avg_completion_ms: f32,
    pub last_used_generation: u32,
}

impl LearnedStrategy {
    /// `success_weight * success_rate + speed_weight / max(avg_ms, floor)`.
    ///
    /// With completion times in the hundreds of milliseconds or more the speed
    /// term stays in the thousandths, so it only orders entries whose success
    /// rates are equal.
    pub fn score(&self, config: &StrategyConfig) -> f32 {
        config.success_weight * self.success_rate
            + config.speed_weight / self.avg_completion_ms.max(config.completion_floor_ms)
    }

    pub fn is_weak(&self, config: &StrategyConfig) -> bool {
        self.times_used >= config.prune_min_samples && self.success_rate < config.prune_cutoff
    }

    fn is_stale(&self, generation: u32, config: &StrategyConfig) -> bool {
        config.stale_after_generations > 0
            && generation.saturating_sub(self.last_used_generation)
                > config.stale_after_generations
    }

    fn record(&mut self, succeeded: bool, completion_ms: u32, generation: u32) {
        self.times_used = self.times_used.saturating_add(1);
        if succeeded {
            self.times_succeeded = self.times_succeeded.saturating_add(1);
        }
        self.success_rate = self.times_succeeded as f32 / self.times_used as f32;
        let n = self.times_used as f32;
        self.avg_completion_ms += (completion_ms as f32 - self.avg_completion_ms) / n;
        self.last_used_generation = generation;
    }
}

/// One observed maneuver, fed back into memory after the fact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManeuverSample {
    pub distance_mm: u16,
    pub direction: TurnDirection,
    pub backup_ms: u16,
    pub turn_ms: u16,
    pub succeeded: bool,
    pub completion_ms: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnOutcome {
    Updated(usize),
    Inserted(usize),
    Dropped,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMemory {
    entries: Vec<LearnedStrategy>,
}

impl StrategyMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: Vec<LearnedStrategy>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LearnedStrategy] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&LearnedStrategy> {
        self.entries.get(index)
    }

    /// Keep at most `capacity` entries, dropping the newest.
    pub(crate) fn truncate(&mut self, capacity: usize) {
        self.entries.truncate(capacity);
    }

    pub fn learn(
        &mut self,
        sample: ManeuverSample,
        generation: u32,
        config: &StrategyConfig,
    ) -> LearnOutcome {
        let existing = self.entries.iter().position(|entry| {
            entry.direction == sample.direction
                && entry.context_distance_mm.abs_diff(sample.distance_mm)
                    < config.match_tolerance_mm
        });

        if let Some(index) = existing {
            let entry = &mut self.entries[index];
            entry.record(sample.succeeded, sample.completion_ms, generation);
            debug!(
                index,
                success_rate = entry.success_rate,
                uses = entry.times_used,
                "strategy updated"
            );
            return LearnOutcome::Updated(index);
        }

        if self.entries.len() >= config.capacity {
            self.prune_weak(config);
            self.compact(generation, config);
        }
        if self.entries.len() >= config.capacity {
            warn!(
                capacity = config.capacity,
                distance_mm = sample.distance_mm,
                "strategy memory full, dropping new maneuver"
            );
            return LearnOutcome::Dropped;
        }

        self.entries.push(LearnedStrategy {
            context_distance_mm: sample.distance_mm,
            direction: sample.direction,
            backup_ms: sample.backup_ms,
            turn_ms: sample.turn_ms,
            success_rate: if sample.succeeded { 1.0 } else { 0.0 },
            times_used: 1,
            times_succeeded: u32::from(sample.succeeded),
            avg_completion_ms: sample.completion_ms as f32,
            last_used_generation: generation,
        });
        let index = self.entries.len() - 1;
        debug!(index, distance_mm = sample.distance_mm, "strategy learned");
        LearnOutcome::Inserted(index)
    }

    /// Highest-scoring entry near `distance_mm`. Ties keep the lowest index.
    pub fn best(
        &self,
        distance_mm: u16,
        config: &StrategyConfig,
    ) -> Option<(usize, &LearnedStrategy)> {
        let mut best: Option<(usize, &LearnedStrategy, f32)> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.context_distance_mm.abs_diff(distance_mm) >= config.query_tolerance_mm
                || entry.times_used < config.min_uses.max(1)
            {
                continue;
            }
            let score = entry.score(config);
            if best.map_or(true, |(_, _, top)| score > top) {
                best = Some((index, entry, score));
            }
        }
        best.map(|(index, entry, _)| (index, entry))
    }

    /// Best entry, but only exploited with probability `exploit_probability`.
    pub fn choose(
        &self,
        distance_mm: u16,
        config: &StrategyConfig,
        rng: &mut SeededRng,
    ) -> Option<LearnedStrategy> {
        let (_, entry) = self.best(distance_mm, config)?;
        rng.chance(config.exploit_probability).then_some(*entry)
    }

    pub fn prune_weak(&mut self, config: &StrategyConfig) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !entry.is_weak(config));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "weak strategies pruned");
        }
        removed
    }

    /// Drop zero-use and stale entries, closing the gaps.
    pub fn compact(&mut self, generation: u32, config: &StrategyConfig) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.times_used > 0 && !entry.is_stale(generation, config));
        before - self.entries.len()
    }
}
