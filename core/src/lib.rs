#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod behavior;
pub mod body;
pub mod brain;
pub mod config;
pub mod constants;
pub mod emotion;
pub mod error;
pub mod evolution;
pub mod fitness;
pub mod genome;
pub mod layout;
pub mod metrics;
pub mod rng;
pub mod store;
pub mod strategy;
pub mod vocabulary;

pub use behavior::{Activity, TickReport};
pub use body::{Body, Clock, Motion, MotionSensor, Motors, RangeSensor, Reading, SignalSink};
pub use brain::{BootReport, BotBrain, CycleReport, Expression, RegionStatus, Telemetry};
pub use config::EngineConfig;
pub use emotion::EmotionalState;
pub use error::{BrainError, ConfigError, RegionFault, StoreError};
pub use evolution::{GenomeEvolution, TrialOutcome};
pub use fitness::{FitnessBreakdown, FitnessWindow};
pub use genome::{Genome, GenomeSchema, Param};
pub use layout::Region;
pub use metrics::PerformanceMetrics;
pub use rng::SeededRng;
pub use store::{MemStore, NvStore};
pub use strategy::{LearnOutcome, LearnedStrategy, ManeuverSample, StrategyMemory, TurnDirection};
pub use vocabulary::{ContextKind, Cue, SignalLookup, SignalPattern, SignalWord, Tone, Vocabulary};
