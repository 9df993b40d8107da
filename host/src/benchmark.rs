use crate::runner::{run_session, SessionConfig, SessionReport};
use crate::sim::SimConfig;
use crate::util::seed_to_hex;
use anyhow::{anyhow, Context, Result};
use evobot_core::constants::STORE_SIZE;
use evobot_core::{EngineConfig, MemStore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub engine: EngineConfig,
    pub seeds: Vec<u32>,
    pub ticks: u32,
    pub sim: SimConfig,
    pub out_dir: PathBuf,
    pub jobs: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub rank: usize,
    pub seed: u32,
    pub seed_hex: String,
    pub fitness: f32,
    pub generation: u32,
    pub success_rate: f32,
    pub obstacles: u32,
    pub cleared: u32,
    pub escapes_succeeded: u32,
    pub distance_mm: u32,
    pub strategy_count: usize,
    pub vocabulary_size: usize,
    pub cycles: u32,
    pub accepted: u32,
    pub reverted: u32,
    pub final_rng_state: u32,
}

impl RunRecord {
    fn from_session(report: &SessionReport) -> Self {
        let telemetry = &report.telemetry;
        Self {
            rank: 0,
            seed: report.seed,
            seed_hex: report.seed_hex.clone(),
            fitness: telemetry.fitness_score,
            generation: telemetry.generation,
            success_rate: telemetry.metrics.success_rate(),
            obstacles: report.counts.obstacles,
            cleared: report.counts.cleared,
            escapes_succeeded: report.counts.escapes_succeeded,
            distance_mm: telemetry.metrics.total_distance_mm,
            strategy_count: telemetry.strategy_count,
            vocabulary_size: telemetry.vocabulary_size,
            cycles: report.counts.cycles,
            accepted: report.counts.accepted,
            reverted: report.counts.reverted,
            final_rng_state: report.final_rng_state,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub generated_unix_s: u64,
    pub profile: String,
    pub ticks: u32,
    pub jobs: Option<usize>,
    pub seeds: Vec<u32>,
    pub run_count: usize,
    pub mean_fitness: f64,
    pub best_fitness: f32,
    pub mean_success_rate: f64,
    pub mean_generation: f64,
    pub runs: Vec<RunRecord>,
}

pub fn run_benchmark(config: BenchmarkConfig) -> Result<BenchmarkReport> {
    if config.seeds.is_empty() {
        return Err(anyhow!("benchmark requires at least one seed"));
    }
    if config.ticks == 0 {
        return Err(anyhow!("benchmark requires at least one tick per run"));
    }
    if let Some(jobs) = config.jobs {
        if jobs == 0 {
            return Err(anyhow!("benchmark --jobs must be >= 1 when provided"));
        }
    }
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("failed creating {}", config.out_dir.display()))?;

    let run_one = |seed: &u32| -> Result<SessionReport> {
        let session = SessionConfig {
            engine: config.engine.clone(),
            seed: *seed,
            ticks: config.ticks,
            sim: config.sim.clone(),
        };
        // Every run gets its own erased store so runs never see each other's state.
        let (report, _) = run_session(MemStore::erased(STORE_SIZE), &session, None)
            .with_context(|| format!("benchmark run failed for seed={}", seed_to_hex(*seed)))?;
        Ok(report)
    };

    let results: Vec<Result<SessionReport>> = if let Some(jobs) = config.jobs {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("failed to build rayon threadpool")?;
        pool.install(|| config.seeds.par_iter().map(run_one).collect())
    } else {
        config.seeds.par_iter().map(run_one).collect()
    };

    let mut sessions = Vec::with_capacity(results.len());
    for result in results {
        sessions.push(result?);
    }

    let mut runs: Vec<RunRecord> = sessions.iter().map(RunRecord::from_session).collect();
    runs.sort_by(|a, b| {
        b.fitness
            .total_cmp(&a.fitness)
            .then_with(|| b.cleared.cmp(&a.cleared))
            .then_with(|| a.seed.cmp(&b.seed))
    });
    for (index, run) in runs.iter_mut().enumerate() {
        run.rank = index + 1;
    }

    let count = runs.len() as f64;
    let report = BenchmarkReport {
        generated_unix_s: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        profile: config.engine.profile.clone(),
        ticks: config.ticks,
        jobs: config.jobs,
        seeds: config.seeds.clone(),
        run_count: runs.len(),
        mean_fitness: runs.iter().map(|r| r.fitness as f64).sum::<f64>() / count,
        best_fitness: runs.first().map(|r| r.fitness).unwrap_or_default(),
        mean_success_rate: runs.iter().map(|r| r.success_rate as f64).sum::<f64>() / count,
        mean_generation: runs.iter().map(|r| r.generation as f64).sum::<f64>() / count,
        runs,
    };

    let summary_path = config.out_dir.join("summary.json");
    let encoded = serde_json::to_vec_pretty(&report)?;
    fs::write(&summary_path, encoded)
        .with_context(|| format!("failed writing {}", summary_path.display()))?;
    info!(
        runs = report.run_count,
        mean_fitness = report.mean_fitness,
        best_fitness = report.best_fitness,
        summary = %summary_path.display(),
        "benchmark complete"
    );

    Ok(report)
}
