use crate::emitter::EmitterHandle;
use crate::sim::{SimBody, SimConfig, SimStats};
use crate::util::seed_to_hex;
use anyhow::{Context, Result};
use evobot_core::behavior::Maneuver;
use evobot_core::{
    Activity, BootReport, BotBrain, Clock, EngineConfig, NvStore, Region, RegionStatus,
    Telemetry, TickReport,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub seed: u32,
    pub ticks: u32,
    pub sim: SimConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    pub obstacles: u32,
    pub cleared: u32,
    pub learned_maneuvers: u32,
    pub blocked: u32,
    pub escapes_attempted: u32,
    pub escapes_succeeded: u32,
    pub blind_ticks: u32,
    pub sleeps: u32,
    pub wakes: u32,
    pub cycles: u32,
    pub accepted: u32,
    pub reverted: u32,
}

impl SessionCounts {
    fn record(&mut self, tick: &TickReport) {
        match tick.activity {
            Activity::Obstacle { report } => {
                self.obstacles += 1;
                if report.cleared {
                    self.cleared += 1;
                }
                match report.maneuver {
                    Maneuver::Learned => self.learned_maneuvers += 1,
                    Maneuver::Blocked => self.blocked += 1,
                    Maneuver::Scanned => {}
                }
                if let Some(escape) = report.escape {
                    self.escapes_attempted += 1;
                    if escape.escaped {
                        self.escapes_succeeded += 1;
                    }
                }
            }
            Activity::Cruising { distance_mm: None } => self.blind_ticks += 1,
            Activity::FellAsleep => self.sleeps += 1,
            Activity::Woke => self.wakes += 1,
            Activity::Cruising { .. } | Activity::Asleep => {}
        }
        if let Some(cycle) = tick.cycle {
            self.cycles += 1;
            match cycle.outcome {
                Some(outcome) if outcome.accepted() => self.accepted += 1,
                Some(_) => self.reverted += 1,
                None => {}
            }
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionReport {
    pub profile: String,
    pub seed: u32,
    pub seed_hex: String,
    pub ticks: u32,
    pub sim_elapsed_ms: u64,
    pub fresh_boot: bool,
    pub recovered_regions: Vec<String>,
    pub counts: SessionCounts,
    pub telemetry: Telemetry,
    pub sim: SimStats,
    pub final_rng_state: u32,
}

fn recovered_regions(boot: &BootReport) -> Vec<String> {
    Region::ALL
        .iter()
        .filter_map(|region| match boot.status(*region) {
            RegionStatus::Recovered(fault) => Some(format!("{region}: {fault}")),
            _ => None,
        })
        .collect()
}

/// Boot a brain on `store`, drive it through `ticks` simulated control-loop
/// iterations and save for sleep. The store is handed back for inspection.
pub fn run_session<S: NvStore>(
    store: S,
    config: &SessionConfig,
    emitter: Option<EmitterHandle>,
) -> Result<(SessionReport, S)> {
    let (mut brain, boot) = BotBrain::boot(config.engine.clone(), store, config.seed)
        .with_context(|| format!("failed to boot brain for seed={}", seed_to_hex(config.seed)))?;
    let mut body = SimBody::new(config.sim.clone(), config.seed, emitter);
    let mut counts = SessionCounts::default();

    brain.greet(&mut body);
    let idle_every = config.sim.idle_every_ticks;
    for tick_index in 1..=config.ticks {
        let tick = brain
            .tick(&mut body)
            .with_context(|| format!("tick {tick_index} failed"))?;
        counts.record(&tick);
        if idle_every > 0 && tick_index % idle_every == 0 {
            body.idle(config.sim.idle_gap_ms);
        }
    }
    brain
        .prepare_for_sleep()
        .context("failed saving state at session end")?;

    let telemetry = brain.telemetry();
    let report = SessionReport {
        profile: telemetry.profile.clone(),
        seed: config.seed,
        seed_hex: seed_to_hex(config.seed),
        ticks: config.ticks,
        sim_elapsed_ms: body.now_ms(),
        fresh_boot: boot.fresh(),
        recovered_regions: recovered_regions(&boot),
        counts,
        telemetry,
        sim: body.stats(),
        final_rng_state: brain.rng_state(),
    };
    info!(
        seed = %report.seed_hex,
        generation = report.telemetry.generation,
        fitness = report.telemetry.fitness_score,
        obstacles = counts.obstacles,
        cleared = counts.cleared,
        cycles = counts.cycles,
        "session finished"
    );
    Ok((report, brain.into_store()))
}
