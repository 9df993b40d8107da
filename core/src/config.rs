//! Every tunable of the engine, grouped per component, with named presets.

use alloc::string::String;

use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorConfig;
use crate::constants::{LAYOUT_END, MAX_STRATEGY_SLOTS, MAX_VOCABULARY_SLOTS};
use crate::emotion::EmotionConfig;
use crate::error::ConfigError;
use crate::evolution::SchedulerConfig;
use crate::fitness::FitnessConfig;
use crate::genome::GenomeSchema;
use crate::layout::PersistenceConfig;
use crate::strategy::StrategyConfig;
use crate::vocabulary::VocabularyConfig;

pub const PRESET_NAMES: [&str; 2] = ["wheelie", "speedie"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub profile: String,
    pub genome: GenomeSchema,
    pub fitness: FitnessConfig,
    pub scheduler: SchedulerConfig,
    pub strategy: StrategyConfig,
    pub vocabulary: VocabularyConfig,
    #[serde(default)]
    pub emotion: EmotionConfig,
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Default for EngineConfig {
    /// The cautious explorer: fitness in `[0, 1]`, nine evolvable parameters.
    fn default() -> Self {
        Self {
            profile: String::from("wheelie"),
            genome: GenomeSchema::wheelie(),
            fitness: FitnessConfig::wheelie(),
            scheduler: SchedulerConfig::wheelie(),
            strategy: StrategyConfig::wheelie(),
            vocabulary: VocabularyConfig::wheelie(),
            emotion: EmotionConfig::default(),
            behavior: BehaviorConfig::wheelie(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "wheelie" => Some(Self::default()),
            // Speed-optimised: twelve evolvable parameters and a speed bonus up to fitness 2.0.
            "speedie" => Some(Self {
                profile: String::from("speedie"),
                genome: GenomeSchema::speedie(),
                fitness: FitnessConfig::speedie(),
                scheduler: SchedulerConfig::speedie(),
                strategy: StrategyConfig::speedie(),
                vocabulary: VocabularyConfig::speedie(),
                emotion: EmotionConfig::default(),
                behavior: BehaviorConfig::speedie(),
                persistence: PersistenceConfig::default(),
            }),
            _ => None,
        }
    }

    /// Rejects anything the persisted layout or the algorithms cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.genome.validate()?;

        if self.strategy.capacity == 0 || self.strategy.capacity > MAX_STRATEGY_SLOTS {
            return Err(ConfigError::StrategyCapacity {
                requested: self.strategy.capacity,
                max: MAX_STRATEGY_SLOTS,
            });
        }
        if self.vocabulary.capacity == 0 || self.vocabulary.capacity > MAX_VOCABULARY_SLOTS {
            return Err(ConfigError::VocabularyCapacity {
                requested: self.vocabulary.capacity,
                max: MAX_VOCABULARY_SLOTS,
            });
        }

        let probabilities = [
            ("scheduler.momentum_probability", self.scheduler.momentum_probability),
            ("strategy.exploit_probability", self.strategy.exploit_probability),
            ("strategy.save_probability", self.strategy.save_probability),
            ("vocabulary.mutation_probability", self.vocabulary.mutation_probability),
            (
                "behavior.post_obstacle_evolution_probability",
                self.behavior.post_obstacle_evolution_probability,
            ),
            ("behavior.chatter_probability", self.behavior.chatter_probability),
        ];
        for (field, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { field, value });
            }
        }

        let s = &self.scheduler;
        if !(s.min_multiplier > 0.0 && s.min_multiplier <= s.max_multiplier) {
            return Err(ConfigError::SchedulerMultipliers {
                min: s.min_multiplier,
                max: s.max_multiplier,
            });
        }
        Ok(())
    }

    pub fn validate_store(&self, capacity: usize) -> Result<(), ConfigError> {
        if capacity < LAYOUT_END {
            return Err(ConfigError::StoreTooSmall {
                capacity,
                required: LAYOUT_END,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for name in PRESET_NAMES {
            let config = EngineConfig::preset(name).unwrap();
            assert_eq!(config.profile, name);
            config.validate().unwrap();
        }
        assert!(EngineConfig::preset("tank").is_none());
    }

    #[test]
    fn rejects_oversized_tables() {
        let mut config = EngineConfig::default();
        config.strategy.capacity = MAX_STRATEGY_SLOTS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StrategyCapacity { .. })
        ));

        let mut config = EngineConfig::default();
        config.vocabulary.capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VocabularyCapacity { .. })
        ));
    }

    #[test]
    fn rejects_bad_probability() {
        let mut config = EngineConfig::default();
        config.strategy.exploit_probability = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Probability {
                field: "strategy.exploit_probability",
                ..
            })
        ));
    }

    #[test]
    fn rejects_small_store() {
        let config = EngineConfig::default();
        assert!(config.validate_store(1024).is_err());
        assert!(config.validate_store(4096).is_ok());
    }

    #[test]
    fn json_roundtrip_preserves_preset() {
        let config = EngineConfig::preset("speedie").unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
