//! Reduces performance counters to a single scalar fitness.

use serde::{Deserialize, Serialize};

use crate::metrics::PerformanceMetrics;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessWindow {
    /// Lifetime counters. Fitness stabilises as the robot ages.
    #[default]
    Cumulative,
    /// Only what happened since the current evolution cycle began.
    PerCycle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitnessConfig {
    pub success_weight: f32,
    pub escape_weight: f32,
    /// Zero disables the speed bonus.
    pub speed_weight: f32,
    pub speed_reference_ms: u32,
    pub speed_floor_ms: u32,
    pub max_fitness: f32,
    pub window: FitnessWindow,
}

impl FitnessConfig {
    pub fn wheelie() -> Self {
        Self {
            success_weight: 0.6,
            escape_weight: 0.4,
            speed_weight: 0.0,
            speed_reference_ms: 5_000,
            speed_floor_ms: 1_000,
            max_fitness: 1.0,
            window: FitnessWindow::Cumulative,
        }
    }

    pub fn speedie() -> Self {
        Self {
            success_weight: 0.5,
            escape_weight: 0.3,
            speed_weight: 0.2,
            speed_reference_ms: 5_000,
            speed_floor_ms: 1_000,
            max_fitness: 2.0,
            window: FitnessWindow::Cumulative,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitnessBreakdown {
    pub success_rate: f32,
    pub escape_rate: f32,
    pub speed_factor: Option<f32>,
    pub fitness: f32,
}

pub fn evaluate(metrics: &PerformanceMetrics, config: &FitnessConfig) -> FitnessBreakdown {
    let success_rate = metrics.success_rate();
    let escape_rate = metrics.escape_rate();
    let mut fitness = config.success_weight * success_rate + config.escape_weight * escape_rate;

    let speed_factor = if config.speed_weight > 0.0 {
        let factor = match metrics.fastest_completion_ms {
            Some(fastest) => {
                1.0 + config.speed_reference_ms as f32
                    / fastest.max(config.speed_floor_ms).max(1) as f32
            }
            None => 1.0,
        };
        fitness += config.speed_weight * factor;
        Some(factor)
    } else {
        None
    };

    FitnessBreakdown {
        success_rate,
        escape_rate,
        speed_factor,
        fitness: fitness.clamp(0.0, config.max_fitness),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(cleared: u32, encountered: u32, escapes: u32, trapped: u32) -> PerformanceMetrics {
        PerformanceMetrics {
            obstacles_encountered: encountered,
            obstacles_cleared: cleared,
            times_trapped: trapped,
            trap_escapes: escapes,
            ..PerformanceMetrics::default()
        }
    }

    #[test]
    fn mostly_clear_run_scores_094() {
        let result = evaluate(&metrics(18, 20, 1, 1), &FitnessConfig::wheelie());
        assert!((result.fitness - 0.94).abs() < 1e-5, "{}", result.fitness);
        assert_eq!(result.speed_factor, None);
    }

    #[test]
    fn frequently_trapped_run_scores_0613() {
        let result = evaluate(&metrics(24, 30, 2, 6), &FitnessConfig::wheelie());
        assert!((result.fitness - 0.613_333).abs() < 1e-4, "{}", result.fitness);
    }

    #[test]
    fn empty_counters_score_zero() {
        let result = evaluate(&PerformanceMetrics::default(), &FitnessConfig::wheelie());
        assert_eq!(result.fitness, 0.0);
    }

    #[test]
    fn speed_bonus_rewards_fast_completions() {
        let config = FitnessConfig::speedie();
        let mut slow = metrics(10, 10, 1, 1);
        slow.fastest_completion_ms = Some(5_000);
        let mut fast = slow;
        fast.fastest_completion_ms = Some(1_000);

        let slow = evaluate(&slow, &config);
        let fast = evaluate(&fast, &config);
        assert_eq!(slow.speed_factor, Some(2.0));
        assert_eq!(fast.speed_factor, Some(6.0));
        assert!(fast.fitness > slow.fitness);
        assert!(fast.fitness <= config.max_fitness);
    }

    #[test]
    fn speed_factor_is_neutral_before_first_clear() {
        let result = evaluate(&metrics(0, 3, 0, 0), &FitnessConfig::speedie());
        assert_eq!(result.speed_factor, Some(1.0));
        assert!((result.fitness - 0.2).abs() < 1e-6);
    }

    #[test]
    fn sub_floor_times_are_capped() {
        let config = FitnessConfig::speedie();
        let mut m = metrics(1, 1, 0, 0);
        m.fastest_completion_ms = Some(10);
        assert_eq!(evaluate(&m, &config).speed_factor, Some(6.0));
    }
}
