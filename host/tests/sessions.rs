use anyhow::Result;
use evobot_core::constants::STORE_SIZE;
use evobot_core::layout::{self, Loaded};
use evobot_core::{EngineConfig, MemStore, Region};
use evobot_host::benchmark::{run_benchmark, BenchmarkConfig};
use evobot_host::emitter::{spawn_emitter, EmitterConfig};
use evobot_host::file_store::FileStore;
use evobot_host::runner::{run_session, SessionConfig};
use evobot_host::sim::SimConfig;
use std::fs;

fn session(seed: u32, ticks: u32) -> SessionConfig {
    SessionConfig {
        engine: EngineConfig::default(),
        seed,
        ticks,
        sim: SimConfig::default(),
    }
}

#[test]
fn file_image_carries_evolution_across_restarts() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("bot.img");

    let store = FileStore::open(&path, STORE_SIZE)?;
    let (first, store) = run_session(store, &session(0xC0FF_EE11, 3_000), None)?;
    assert!(first.fresh_boot);
    assert!(first.recovered_regions.is_empty());
    drop(store);

    let reopened = FileStore::open(&path, STORE_SIZE)?;
    let summary = layout::inspect(&reopened)?;
    match &summary.genome {
        Loaded::Valid(evolution) => {
            assert_eq!(evolution.genome.generation, first.telemetry.generation);
        }
        other => panic!("genome region not valid after restart: {other:?}"),
    }
    match &summary.metrics {
        Loaded::Valid(metrics) => assert_eq!(*metrics, first.telemetry.metrics),
        other => panic!("metrics region not valid after restart: {other:?}"),
    }

    let (second, _) = run_session(reopened, &session(0xC0FF_EE12, 500), None)?;
    assert!(!second.fresh_boot);
    assert!(second.telemetry.generation >= first.telemetry.generation);
    assert!(
        second.telemetry.metrics.obstacles_encountered
            >= first.telemetry.metrics.obstacles_encountered
    );
    Ok(())
}

#[test]
fn corrupted_image_region_is_recovered() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("bot.img");
    run_session(FileStore::open(&path, STORE_SIZE)?, &session(5, 200), None)?;

    let mut bytes = fs::read(&path)?;
    bytes[Region::Metrics.offset() + 8] ^= 0x01;
    fs::write(&path, bytes)?;

    let store = FileStore::open(&path, STORE_SIZE)?;
    let (report, store) = run_session(store, &session(5, 10), None)?;
    assert!(!report.fresh_boot);
    assert_eq!(report.recovered_regions.len(), 1);
    assert!(report.recovered_regions[0].starts_with("metrics"));
    assert!(matches!(layout::inspect(&store)?.metrics, Loaded::Valid(_)));
    Ok(())
}

#[test]
fn sessions_replay_exactly_from_their_seed() -> Result<()> {
    let config = session(0xDEAD_BEEF, 2_000);
    let (a, store_a) = run_session(MemStore::erased(STORE_SIZE), &config, None)?;
    let (b, store_b) = run_session(MemStore::erased(STORE_SIZE), &config, None)?;
    assert_eq!(a.telemetry, b.telemetry);
    assert_eq!(a.counts, b.counts);
    assert_eq!(a.final_rng_state, b.final_rng_state);
    assert_eq!(store_a.as_bytes(), store_b.as_bytes());
    assert!(a.counts.obstacles > 0, "simulated arena produced no obstacles");
    Ok(())
}

#[test]
fn long_session_evolves_and_speaks() -> Result<()> {
    let config = session(0x1234_5678, 6_000);
    let (report, _) = run_session(MemStore::erased(STORE_SIZE), &config, None)?;
    assert!(report.counts.cycles >= 1);
    assert!(report.telemetry.generation >= 1);
    assert!(report.telemetry.vocabulary_size >= 5);
    assert!(report.telemetry.vocabulary_size <= 50);
    assert!(report.telemetry.last_communication_ms.is_some());
    assert!(report.sim.signals > 0);
    Ok(())
}

#[test]
fn idle_gaps_put_the_robot_to_sleep() -> Result<()> {
    let mut config = session(77, 400);
    config.sim.idle_every_ticks = 100;
    let (report, _) = run_session(MemStore::erased(STORE_SIZE), &config, None)?;
    assert!(report.counts.sleeps >= 1);
    assert_eq!(report.sim.idle_gaps, 4);
    Ok(())
}

#[tokio::test]
async fn decoupled_emitter_accounts_for_every_signal() -> Result<()> {
    let (handle, task) = spawn_emitter(EmitterConfig {
        queue_capacity: 4,
        time_scale: 0.0,
    });
    let config = session(0xABCD_0001, 1_000);
    let (report, _) = tokio::task::spawn_blocking(move || {
        run_session(MemStore::erased(STORE_SIZE), &config, Some(handle))
    })
    .await??;
    let stats = task.await?;
    assert_eq!(stats.rendered + stats.dropped, report.sim.signals);
    assert!(stats.rendered > 0);
    Ok(())
}

#[test]
fn benchmark_ranks_runs_and_writes_summary() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let report = run_benchmark(BenchmarkConfig {
        engine: EngineConfig::preset("speedie").unwrap(),
        seeds: vec![1, 2, 3, 4],
        ticks: 800,
        sim: SimConfig::default(),
        out_dir: tmp.path().to_path_buf(),
        jobs: Some(2),
    })?;

    assert_eq!(report.run_count, 4);
    assert_eq!(report.profile, "speedie");
    for (index, run) in report.runs.iter().enumerate() {
        assert_eq!(run.rank, index + 1);
    }
    for pair in report.runs.windows(2) {
        assert!(pair[0].fitness >= pair[1].fitness);
    }

    let summary: serde_json::Value =
        serde_json::from_slice(&fs::read(tmp.path().join("summary.json"))?)?;
    assert_eq!(summary["run_count"], 4);
    assert_eq!(summary["runs"].as_array().map(Vec::len), Some(4));
    Ok(())
}

#[test]
fn benchmark_rejects_bad_input() {
    let tmp = tempfile::tempdir().unwrap();
    let base = BenchmarkConfig {
        engine: EngineConfig::default(),
        seeds: vec![1],
        ticks: 10,
        sim: SimConfig::default(),
        out_dir: tmp.path().to_path_buf(),
        jobs: Some(0),
    };
    assert!(run_benchmark(base.clone()).is_err());
    assert!(run_benchmark(BenchmarkConfig {
        seeds: Vec::new(),
        jobs: None,
        ..base
    })
    .is_err());
}
