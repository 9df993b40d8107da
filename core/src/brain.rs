//! The single owned aggregate that binds every component to one store.

use alloc::string::String;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::behavior::ControlState;
use crate::body::SignalSink;
use crate::config::EngineConfig;
use crate::constants::SIGNAL_GAP_MS;
use crate::emotion::{self, EmotionalState};
use crate::error::{BrainError, RegionFault};
use crate::evolution::{EvolutionScheduler, GenomeEvolution, TrialOutcome};
use crate::fitness::{self, FitnessBreakdown, FitnessWindow};
use crate::genome::{Genome, MutationReport};
use crate::layout::{self, CorruptionPolicy, Loaded, Region};
use crate::metrics::PerformanceMetrics;
use crate::rng::SeededRng;
use crate::store::NvStore;
use crate::strategy::{LearnOutcome, LearnedStrategy, ManeuverSample, StrategyMemory};
use crate::vocabulary::{self, ContextKind, EvolveReport, SignalLookup, Vocabulary};

#[derive(Clone, Debug, PartialEq)]
pub enum RegionStatus {
    Loaded,
    /// Never written; defaults were persisted.
    Initialized,
    /// Corrupt; defaults were persisted over it.
    Recovered(RegionFault),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BootReport {
    pub genome: RegionStatus,
    pub strategies: RegionStatus,
    pub metrics: RegionStatus,
    pub vocabulary: RegionStatus,
}

impl BootReport {
    pub fn status(&self, region: Region) -> &RegionStatus {
        match region {
            Region::Genome => &self.genome,
            Region::Strategies => &self.strategies,
            Region::Metrics => &self.metrics,
            Region::Vocabulary => &self.vocabulary,
        }
    }

    pub fn fresh(&self) -> bool {
        Region::ALL
            .iter()
            .all(|region| *self.status(*region) == RegionStatus::Initialized)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub context: ContextKind,
    pub valence: i8,
    pub emotion: EmotionalState,
    pub signal: SignalLookup,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub at_ms: u64,
    pub generation: u32,
    pub fitness: FitnessBreakdown,
    pub outcome: Option<TrialOutcome>,
    pub mutation: Option<MutationReport>,
    pub momentum: bool,
    pub vocabulary: EvolveReport,
    pub pruned: usize,
    pub next_interval_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub profile: String,
    pub generation: u32,
    pub fitness_score: f32,
    pub success_count: u32,
    pub failure_count: u32,
    pub trial_pending: bool,
    pub strategy_count: usize,
    pub vocabulary_size: usize,
    pub interval_ms: u64,
    pub last_communication_ms: Option<u64>,
    pub emotion: EmotionalState,
    pub metrics: PerformanceMetrics,
}

pub struct BotBrain<S: NvStore> {
    pub(crate) config: EngineConfig,
    pub(crate) store: S,
    pub(crate) rng: SeededRng,
    pub(crate) evolution: GenomeEvolution,
    pub(crate) metrics: PerformanceMetrics,
    pub(crate) cycle_baseline: PerformanceMetrics,
    pub(crate) strategies: StrategyMemory,
    pub(crate) vocabulary: Vocabulary,
    pub(crate) scheduler: EvolutionScheduler,
    pub(crate) last_communication_ms: Option<u64>,
    pub(crate) control: ControlState,
}

fn resolve<T>(
    loaded: Loaded<T>,
    region: Region,
    policy: CorruptionPolicy,
    default: impl FnOnce() -> T,
) -> Result<(T, RegionStatus), BrainError> {
    match loaded {
        Loaded::Valid(value) => Ok((value, RegionStatus::Loaded)),
        Loaded::Unwritten => {
            debug!(%region, "region unwritten, using defaults");
            Ok((default(), RegionStatus::Initialized))
        }
        Loaded::Corrupt(fault) => match policy {
            CorruptionPolicy::FallbackToDefaults => {
                warn!(%region, %fault, "corrupt region, falling back to defaults");
                Ok((default(), RegionStatus::Recovered(fault)))
            }
            CorruptionPolicy::Refuse => Err(BrainError::CorruptRegion { region, fault }),
        },
    }
}

impl<S: NvStore> BotBrain<S> {
    /// Restore state from `store`, filling unwritten or rejected regions with
    /// defaults and persisting them straight away. The virtual clock is assumed
    /// to start at zero at power-on.
    pub fn boot(config: EngineConfig, mut store: S, seed: u32) -> Result<(Self, BootReport), BrainError> {
        config.validate()?;
        config.validate_store(store.capacity())?;

        let policy = config.persistence.corruption_policy;
        let mut rng = SeededRng::new(seed);

        let (mut evolution, genome_status) = resolve(
            layout::load(&store, Region::Genome, layout::decode_genome)?,
            Region::Genome,
            policy,
            || GenomeEvolution::new(&config.genome),
        )?;
        let (mut strategies, strategy_status) = resolve(
            layout::load(&store, Region::Strategies, layout::decode_strategies)?,
            Region::Strategies,
            policy,
            StrategyMemory::new,
        )?;
        let (metrics, metrics_status) = resolve(
            layout::load(&store, Region::Metrics, layout::decode_metrics)?,
            Region::Metrics,
            policy,
            PerformanceMetrics::default,
        )?;
        let (mut vocabulary, vocabulary_status) = resolve(
            layout::load(&store, Region::Vocabulary, layout::decode_vocabulary)?,
            Region::Vocabulary,
            policy,
            Vocabulary::new,
        )?;

        // A store written under another profile may hold out-of-range values.
        config.genome.constrain(&mut evolution.genome);
        if let Some(parent) = evolution.parent.as_mut() {
            config.genome.constrain(parent);
        }
        if strategies.len() > config.strategy.capacity {
            warn!(
                stored = strategies.len(),
                capacity = config.strategy.capacity,
                "strategy table larger than configured capacity, truncating"
            );
            strategies.truncate(config.strategy.capacity);
        }
        if vocabulary.len() > config.vocabulary.capacity {
            warn!(
                stored = vocabulary.len(),
                capacity = config.vocabulary.capacity,
                "vocabulary larger than configured capacity, truncating"
            );
            vocabulary.truncate(config.vocabulary.capacity);
        }
        let seeded = vocabulary.is_empty();
        if seeded {
            vocabulary.seed_defaults(evolution.genome.generation, &config.vocabulary, &mut rng);
        }

        if genome_status != RegionStatus::Loaded {
            layout::write_region(&mut store, Region::Genome, &layout::encode_genome(&evolution))?;
        }
        if strategy_status != RegionStatus::Loaded {
            layout::write_region(
                &mut store,
                Region::Strategies,
                &layout::encode_strategies(&strategies),
            )?;
        }
        if metrics_status != RegionStatus::Loaded {
            layout::write_region(&mut store, Region::Metrics, &layout::encode_metrics(&metrics))?;
        }
        if seeded || vocabulary_status != RegionStatus::Loaded {
            layout::write_region(
                &mut store,
                Region::Vocabulary,
                &layout::encode_vocabulary(&vocabulary),
            )?;
        }

        info!(
            profile = %config.profile,
            generation = evolution.genome.generation,
            fitness = evolution.genome.fitness_score,
            strategies = strategies.len(),
            vocabulary = vocabulary.len(),
            "brain booted"
        );

        let brain = Self {
            config,
            store,
            rng,
            evolution,
            metrics,
            cycle_baseline: metrics,
            strategies,
            vocabulary,
            scheduler: EvolutionScheduler::new(0),
            last_communication_ms: None,
            control: ControlState::default(),
        };
        let report = BootReport {
            genome: genome_status,
            strategies: strategy_status,
            metrics: metrics_status,
            vocabulary: vocabulary_status,
        };
        Ok((brain, report))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn genome(&self) -> &Genome {
        &self.evolution.genome
    }

    pub fn evolution(&self) -> &GenomeEvolution {
        &self.evolution
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// For control loops that drive the robot outside [`crate::behavior`].
    pub fn metrics_mut(&mut self) -> &mut PerformanceMetrics {
        &mut self.metrics
    }

    pub fn strategies(&self) -> &StrategyMemory {
        &self.strategies
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn rng_state(&self) -> u32 {
        self.rng.state()
    }

    pub fn trapped_attempts(&self) -> u32 {
        self.control.trapped_attempts
    }

    pub fn mutate(&mut self) -> MutationReport {
        self.evolution.mutate(&self.config.genome, &mut self.rng)
    }

    /// Score the live genome and store the result as its fitness.
    pub fn evaluate_fitness(&mut self) -> FitnessBreakdown {
        let window = match self.config.fitness.window {
            FitnessWindow::Cumulative => self.metrics,
            FitnessWindow::PerCycle => self.metrics.since(&self.cycle_baseline),
        };
        let result = fitness::evaluate(&window, &self.config.fitness);
        self.evolution.genome.fitness_score = result.fitness;
        result
    }

    /// Runs a cycle when the adaptive interval has elapsed since the last one.
    pub fn evolution_cycle<K: SignalSink + ?Sized>(
        &mut self,
        now_ms: u64,
        sink: &mut K,
    ) -> Result<Option<CycleReport>, BrainError> {
        let fitness = self.evolution.genome.fitness_score;
        if !self.scheduler.poll(now_ms, fitness, &self.config.scheduler) {
            return Ok(None);
        }
        self.run_evolution_cycle(now_ms, sink).map(Some)
    }

    /// One full cycle regardless of the interval: evaluate, conclude or start a
    /// trial, evolve the vocabulary, then persist.
    pub fn run_evolution_cycle<K: SignalSink + ?Sized>(
        &mut self,
        now_ms: u64,
        sink: &mut K,
    ) -> Result<CycleReport, BrainError> {
        self.express_state(ContextKind::Evolving, 0, now_ms, sink);
        let fitness = self.evaluate_fitness();

        let mut mutation = None;
        let mut momentum = false;
        let outcome = self.evolution.conclude();
        match outcome {
            Some(TrialOutcome::Accepted { .. }) => {
                self.express_state(ContextKind::Success, 80, now_ms, sink);
                if self.rng.chance(self.config.scheduler.momentum_probability) {
                    mutation = Some(self.mutate());
                    momentum = true;
                }
            }
            Some(TrialOutcome::Reverted { .. }) => {
                self.express_state(ContextKind::Success, -40, now_ms, sink);
                // The restored parent goes straight back under trial with a fresh offspring.
                mutation = Some(self.mutate());
            }
            None => mutation = Some(self.mutate()),
        }

        let vocabulary = if self.vocabulary.is_empty() {
            EvolveReport::default()
        } else {
            let report = self
                .vocabulary
                .evolve(fitness.fitness, &self.config.vocabulary, &mut self.rng);
            self.save_vocabulary()?;
            report
        };

        self.config.genome.constrain(&mut self.evolution.genome);
        self.save_genome()?;
        self.save_metrics()?;

        let pruned = self.strategies.prune_weak(&self.config.strategy);
        if pruned > 0 {
            self.save_strategies()?;
        }
        self.cycle_baseline = self.metrics;

        let genome = self.evolution.genome;
        let report = CycleReport {
            at_ms: now_ms,
            generation: genome.generation,
            fitness,
            outcome,
            mutation,
            momentum,
            vocabulary,
            pruned,
            next_interval_ms: self.config.scheduler.interval_ms(genome.fitness_score),
        };
        info!(
            generation = genome.generation,
            fitness = fitness.fitness,
            accepted = outcome.map(|o| o.accepted()),
            mutated = mutation.is_some(),
            momentum,
            next_interval_ms = report.next_interval_ms,
            "evolution cycle complete"
        );
        Ok(report)
    }

    /// Fold a maneuver outcome into strategy memory; occasionally persists the table.
    pub fn learn_strategy(&mut self, sample: ManeuverSample) -> Result<LearnOutcome, BrainError> {
        let generation = self.evolution.genome.generation;
        let outcome = self
            .strategies
            .learn(sample, generation, &self.config.strategy);
        if outcome != LearnOutcome::Dropped
            && self.rng.chance(self.config.strategy.save_probability)
        {
            self.save_strategies()?;
        }
        Ok(outcome)
    }

    pub fn best_strategy(&self, distance_mm: u16) -> Option<&LearnedStrategy> {
        self.strategies
            .best(distance_mm, &self.config.strategy)
            .map(|(_, entry)| entry)
    }

    /// Best strategy for `distance_mm`, exploited only with the configured probability.
    pub fn choose_strategy(&mut self, distance_mm: u16) -> Option<LearnedStrategy> {
        self.strategies
            .choose(distance_mm, &self.config.strategy, &mut self.rng)
    }

    pub fn find_signal_for_context(&mut self, context: ContextKind, valence: i32) -> SignalLookup {
        let valence = vocabulary::clamp_valence(valence);
        self.vocabulary.find_or_create(
            context,
            valence,
            self.evolution.genome.generation,
            &self.config.vocabulary,
            &mut self.rng,
        )
    }

    /// Pick (or invent) the word for this moment and render it on `sink`.
    pub fn express_state<K: SignalSink + ?Sized>(
        &mut self,
        context: ContextKind,
        valence: i32,
        now_ms: u64,
        sink: &mut K,
    ) -> Expression {
        let emotion = self.emotional_state();
        let signal = self.find_signal_for_context(context, valence);
        let index = signal.index();
        if let Some(word) = self.vocabulary.get(index) {
            sink.emit(&word.pattern, word.cue, SIGNAL_GAP_MS);
        }
        self.vocabulary.mark_used(index);
        self.last_communication_ms = Some(now_ms);

        debug!(
            ?context,
            valence,
            index,
            frustration = emotion.frustration,
            confidence = emotion.confidence,
            "state expressed"
        );
        Expression {
            context,
            valence: vocabulary::clamp_valence(valence),
            emotion,
            signal,
        }
    }

    pub fn emotional_state(&self) -> EmotionalState {
        emotion::assess(
            &self.evolution.genome,
            &self.metrics,
            self.control.trapped_attempts,
            &self.config.emotion,
        )
    }

    pub fn last_communication_ms(&self) -> Option<u64> {
        self.last_communication_ms
    }

    pub fn telemetry(&self) -> Telemetry {
        let genome = &self.evolution.genome;
        Telemetry {
            profile: self.config.profile.clone(),
            generation: genome.generation,
            fitness_score: genome.fitness_score,
            success_count: genome.success_count,
            failure_count: genome.failure_count,
            trial_pending: self.evolution.trial_pending(),
            strategy_count: self.strategies.len(),
            vocabulary_size: self.vocabulary.len(),
            interval_ms: self.config.scheduler.interval_ms(genome.fitness_score),
            last_communication_ms: self.last_communication_ms,
            emotion: self.emotional_state(),
            metrics: self.metrics,
        }
    }

    pub fn save_genome(&mut self) -> Result<(), BrainError> {
        let payload = layout::encode_genome(&self.evolution);
        layout::write_region(&mut self.store, Region::Genome, &payload)?;
        Ok(())
    }

    pub fn save_strategies(&mut self) -> Result<(), BrainError> {
        let payload = layout::encode_strategies(&self.strategies);
        layout::write_region(&mut self.store, Region::Strategies, &payload)?;
        Ok(())
    }

    pub fn save_metrics(&mut self) -> Result<(), BrainError> {
        let payload = layout::encode_metrics(&self.metrics);
        layout::write_region(&mut self.store, Region::Metrics, &payload)?;
        Ok(())
    }

    pub fn save_vocabulary(&mut self) -> Result<(), BrainError> {
        let payload = layout::encode_vocabulary(&self.vocabulary);
        layout::write_region(&mut self.store, Region::Vocabulary, &payload)?;
        Ok(())
    }

    pub fn save_all(&mut self) -> Result<(), BrainError> {
        self.save_genome()?;
        self.save_strategies()?;
        self.save_metrics()?;
        self.save_vocabulary()
    }

    /// Everything that must survive a power cut before entering low-power mode.
    pub fn prepare_for_sleep(&mut self) -> Result<(), BrainError> {
        self.save_genome()?;
        self.save_strategies()?;
        self.save_metrics()?;
        info!(generation = self.evolution.genome.generation, "state saved for sleep");
        Ok(())
    }

    /// Operator action: zero the lifetime counters.
    pub fn reset_metrics(&mut self) -> Result<(), BrainError> {
        self.metrics = PerformanceMetrics::default();
        self.cycle_baseline = self.metrics;
        self.save_metrics()?;
        info!("performance metrics reset");
        Ok(())
    }
}
