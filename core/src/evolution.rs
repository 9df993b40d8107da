//! (1+1) evolution over a single genome, paced by an adaptive interval.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::genome::{self, Genome, GenomeSchema, MutationReport};
use crate::rng::SeededRng;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub base_interval_ms: u64,
    pub k0: f32,
    pub k1: f32,
    pub min_multiplier: f32,
    pub max_multiplier: f32,
    pub momentum_probability: f32,
}

impl SchedulerConfig {
    pub fn wheelie() -> Self {
        Self {
            enabled: true,
            base_interval_ms: 60_000,
            k0: 0.5,
            k1: 1.5,
            min_multiplier: 0.5,
            max_multiplier: 3.0,
            momentum_probability: 0.30,
        }
    }

    pub fn speedie() -> Self {
        Self {
            enabled: true,
            base_interval_ms: 45_000,
            k0: 0.3,
            k1: 1.2,
            min_multiplier: 0.45,
            max_multiplier: 2.7,
            momentum_probability: 0.40,
        }
    }

    /// Low fitness shortens the interval, high fitness stretches it.
    pub fn interval_ms(&self, fitness: f32) -> u64 {
        let multiplier = (self.k0 + fitness * self.k1).clamp(self.min_multiplier, self.max_multiplier);
        (self.base_interval_ms as f32 * multiplier) as u64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionScheduler {
    last_cycle_ms: u64,
}

impl EvolutionScheduler {
    pub fn new(now_ms: u64) -> Self {
        Self {
            last_cycle_ms: now_ms,
        }
    }

    pub fn last_cycle_ms(&self) -> u64 {
        self.last_cycle_ms
    }

    pub fn remaining_ms(&self, now_ms: u64, fitness: f32, config: &SchedulerConfig) -> u64 {
        let elapsed = now_ms.saturating_sub(self.last_cycle_ms);
        config.interval_ms(fitness).saturating_sub(elapsed)
    }

    /// True at most once per interval; arms the next interval when it fires.
    pub fn poll(&mut self, now_ms: u64, fitness: f32, config: &SchedulerConfig) -> bool {
        if !config.enabled {
            return false;
        }
        if now_ms.saturating_sub(self.last_cycle_ms) < config.interval_ms(fitness) {
            return false;
        }
        self.last_cycle_ms = now_ms;
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TrialOutcome {
    Accepted {
        fitness: f32,
        parent_fitness: f32,
        generation: u32,
    },
    Reverted {
        fitness: f32,
        parent_fitness: f32,
        generation: u32,
    },
}

impl TrialOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// The live genome plus the parent snapshot of a trial still being evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenomeEvolution {
    pub genome: Genome,
    pub parent: Option<Genome>,
}

impl GenomeEvolution {
    pub fn new(schema: &GenomeSchema) -> Self {
        Self {
            genome: Genome::from_schema(schema),
            parent: None,
        }
    }

    pub fn trial_pending(&self) -> bool {
        self.parent.is_some()
    }

    /// Start (or extend) a trial. An offspring already under trial keeps its original parent.
    pub fn mutate(&mut self, schema: &GenomeSchema, rng: &mut SeededRng) -> MutationReport {
        if self.parent.is_none() {
            self.parent = Some(self.genome);
        }
        genome::mutate(&mut self.genome, schema, rng)
    }

    /// Accept the offspring when it is at least as fit as its parent, otherwise restore the parent.
    pub fn conclude(&mut self) -> Option<TrialOutcome> {
        let parent = self.parent.take()?;
        let offspring = self.genome;
        let generation = offspring.generation.saturating_add(1);

        let outcome = if offspring.fitness_score >= parent.fitness_score {
            self.genome.success_count = offspring.success_count.saturating_add(1);
            self.genome.generation = generation;
            info!(
                generation,
                fitness = offspring.fitness_score,
                parent_fitness = parent.fitness_score,
                "offspring accepted"
            );
            TrialOutcome::Accepted {
                fitness: offspring.fitness_score,
                parent_fitness: parent.fitness_score,
                generation,
            }
        } else {
            self.genome = Genome {
                values: parent.values,
                fitness_score: parent.fitness_score,
                generation,
                success_count: offspring.success_count,
                failure_count: offspring.failure_count.saturating_add(1),
            };
            info!(
                generation,
                fitness = offspring.fitness_score,
                parent_fitness = parent.fitness_score,
                "offspring reverted"
            );
            TrialOutcome::Reverted {
                fitness: offspring.fitness_score,
                parent_fitness: parent.fitness_score,
                generation,
            }
        };
        debug!(?outcome, "trial concluded");
        Some(outcome)
    }
}
