use serde::{Deserialize, Serialize};

use crate::genome::Genome;
use crate::metrics::PerformanceMetrics;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionConfig {
    pub trapped_weight: u32,
    pub failure_weight: u32,
    pub success_rate_weight: f32,
    pub fitness_weight: f32,
    pub neutral_confidence: u8,
    pub curiosity_baseline: i32,
    pub curiosity_divisor: i32,
    pub curiosity_min: i32,
    pub curiosity_max: i32,
    pub distress_threshold: u8,
    pub triumph_fitness: f32,
    pub triumph_cleared: u32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            trapped_weight: 25,
            failure_weight: 2,
            success_rate_weight: 70.0,
            fitness_weight: 30.0,
            neutral_confidence: 50,
            curiosity_baseline: 60,
            curiosity_divisor: 2,
            curiosity_min: 20,
            curiosity_max: 80,
            distress_threshold: 70,
            triumph_fitness: 0.8,
            triumph_cleared: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub frustration: u8,
    pub confidence: u8,
    pub curiosity: u8,
    pub is_distressed: bool,
    pub is_triumphant: bool,
}

/// Derived on demand from the genome, lifetime counters and the current trap streak.
pub fn assess(
    genome: &Genome,
    metrics: &PerformanceMetrics,
    trapped_attempts: u32,
    config: &EmotionConfig,
) -> EmotionalState {
    let raw_frustration = trapped_attempts
        .saturating_mul(config.trapped_weight)
        .saturating_add(genome.failure_count.saturating_mul(config.failure_weight));
    let frustration = raw_frustration.min(100) as u8;

    let confidence = if metrics.obstacles_encountered == 0 {
        config.neutral_confidence
    } else {
        let blended = config.success_rate_weight * metrics.success_rate()
            + config.fitness_weight * genome.fitness_score;
        blended.clamp(0.0, 100.0) as u8
    };

    let curiosity = (config.curiosity_baseline
        - frustration as i32 / config.curiosity_divisor.max(1))
    .clamp(config.curiosity_min, config.curiosity_max)
    .clamp(0, 100) as u8;

    EmotionalState {
        frustration,
        confidence,
        curiosity,
        is_distressed: frustration > config.distress_threshold,
        is_triumphant: genome.fitness_score > config.triumph_fitness
            && metrics.obstacles_cleared > config.triumph_cleared,
    }
}
