use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use evobot_core::constants::{LAYOUT_END, STORE_SIZE};
use evobot_core::layout::{self, Loaded};
use evobot_core::{BotBrain, Param, Region};
use evobot_host::benchmark::{run_benchmark, BenchmarkConfig};
use evobot_host::emitter::{spawn_emitter, EmitterConfig};
use evobot_host::file_store::FileStore;
use evobot_host::runner::{run_session, SessionConfig};
use evobot_host::sim::SimConfig;
use evobot_host::util::{
    default_seed, default_ticks, load_engine_config, parse_seed, parse_seed_csv, seed_sequence,
};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(name = "evobot")]
#[command(about = "Simulate, inspect and benchmark the self-evolving robot brain")]
struct Cli {
    /// Built-in parameter profile (wheelie or speedie)
    #[arg(long, default_value = "wheelie")]
    profile: String,
    /// Full engine config as JSON; overrides --profile
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulated session against a persistent store image
    Run {
        #[arg(long, default_value = "evobot.img")]
        store: PathBuf,
        /// Hex or decimal; defaults to EVOBOT_SEED
        #[arg(long)]
        seed: Option<String>,
        /// Defaults to EVOBOT_TICKS
        #[arg(long)]
        ticks: Option<u32>,
        /// Render signals on a background task instead of blocking the loop
        #[arg(long)]
        decoupled_emitter: bool,
        #[arg(long, default_value_t = 0.01)]
        emitter_time_scale: f32,
        /// Simulate a pickup-and-set-down every N ticks (0 = never)
        #[arg(long, default_value_t = 0)]
        idle_every: u32,
        /// Write the session report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Decode and print every region of a store image
    Inspect {
        #[arg(long, default_value = "evobot.img")]
        store: PathBuf,
    },
    /// Zero the lifetime performance counters in a store image
    ResetMetrics {
        #[arg(long, default_value = "evobot.img")]
        store: PathBuf,
    },
    /// Run many seeds in parallel on isolated in-memory stores
    Benchmark {
        #[arg(long)]
        seeds: Option<String>,
        #[arg(long)]
        seed_start: Option<String>,
        #[arg(long, default_value_t = 12)]
        seed_count: u32,
        #[arg(long)]
        ticks: Option<u32>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Print the persisted image layout
    Layout,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let Cli {
        profile,
        config,
        command,
    } = Cli::parse();

    match command {
        Commands::Run {
            store,
            seed,
            ticks,
            decoupled_emitter,
            emitter_time_scale,
            idle_every,
            report,
        } => {
            let engine = load_engine_config(&profile, config.as_deref())?;
            let seed = match seed {
                Some(seed) => parse_seed(&seed)?,
                None => default_seed(),
            };
            let session = SessionConfig {
                engine,
                seed,
                ticks: ticks.unwrap_or_else(default_ticks),
                sim: SimConfig {
                    idle_every_ticks: idle_every,
                    ..SimConfig::default()
                },
            };
            let file_store = FileStore::open(&store, STORE_SIZE)?;

            let (emitter, emitter_task) = if decoupled_emitter {
                let (handle, task) = spawn_emitter(EmitterConfig {
                    time_scale: emitter_time_scale,
                    ..EmitterConfig::default()
                });
                (Some(handle), Some(task))
            } else {
                (None, None)
            };

            // The control loop is synchronous; keep it off the async workers.
            let (session_report, _) =
                tokio::task::spawn_blocking(move || run_session(file_store, &session, emitter))
                    .await
                    .context("session task panicked")??;
            if let Some(task) = emitter_task {
                let stats = task.await.context("emitter task panicked")?;
                println!("signals_rendered={}", stats.rendered);
                println!("signals_dropped={}", stats.dropped);
            }

            let telemetry = &session_report.telemetry;
            println!("profile={}", telemetry.profile);
            println!("seed={}", session_report.seed_hex);
            println!("ticks={}", session_report.ticks);
            println!("sim_elapsed_ms={}", session_report.sim_elapsed_ms);
            println!("fresh_boot={}", session_report.fresh_boot);
            for recovered in &session_report.recovered_regions {
                println!("recovered={recovered}");
            }
            println!("generation={}", telemetry.generation);
            println!("fitness={:.4}", telemetry.fitness_score);
            println!(
                "trials accepted={} reverted={}",
                telemetry.success_count, telemetry.failure_count
            );
            println!(
                "obstacles={} cleared={}",
                session_report.counts.obstacles, session_report.counts.cleared
            );
            println!("strategies={}", telemetry.strategy_count);
            println!("vocabulary={}", telemetry.vocabulary_size);
            println!("store={}", store.display());

            if let Some(path) = report {
                write_json(&path, &session_report)?;
                println!("report={}", path.display());
            }
        }
        Commands::Inspect { store } => {
            let file_store = open_existing(&store)?;
            print_image(&file_store)?;
        }
        Commands::ResetMetrics { store } => {
            let engine = load_engine_config(&profile, config.as_deref())?;
            let file_store = open_existing(&store)?;
            let (mut brain, _) = BotBrain::boot(engine, file_store, default_seed())
                .context("failed to boot brain on store image")?;
            brain.reset_metrics()?;
            println!("metrics reset in {}", store.display());
        }
        Commands::Benchmark {
            seeds,
            seed_start,
            seed_count,
            ticks,
            out_dir,
            jobs,
        } => {
            let engine = load_engine_config(&profile, config.as_deref())?;
            let seeds = match seeds {
                Some(csv) => parse_seed_csv(&csv)?,
                None => {
                    let start = match seed_start {
                        Some(start) => parse_seed(&start)?,
                        None => default_seed(),
                    };
                    seed_sequence(start, seed_count)
                }
            };
            let out_dir = out_dir.unwrap_or_else(|| {
                PathBuf::from(format!("benchmarks/{}-{}", engine.profile, timestamp_suffix()))
            });
            let bench = BenchmarkConfig {
                engine,
                seeds,
                ticks: ticks.unwrap_or_else(default_ticks),
                sim: SimConfig::default(),
                out_dir: out_dir.clone(),
                jobs,
            };
            let report = tokio::task::spawn_blocking(move || run_benchmark(bench))
                .await
                .context("benchmark task panicked")??;

            println!("profile={}", report.profile);
            println!("runs={}", report.run_count);
            println!(
                "jobs={}",
                report
                    .jobs
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "auto".to_string())
            );
            println!("mean_fitness={:.4}", report.mean_fitness);
            println!("mean_success_rate={:.4}", report.mean_success_rate);
            println!("out_dir={}", out_dir.display());
            println!("top runs:");
            for run in report.runs.iter().take(5) {
                println!(
                    "  #{} seed={} fitness={:.4} generation={} cleared={}/{}",
                    run.rank, run.seed_hex, run.fitness, run.generation, run.cleared, run.obstacles
                );
            }
        }
        Commands::Layout => {
            println!("store_size={STORE_SIZE}");
            println!("layout_end={LAYOUT_END}");
            println!(
                "{:<12} {:>4} {:>6} {:>6} {:>8}",
                "region", "tag", "offset", "size", "payload"
            );
            for region in Region::ALL {
                println!(
                    "{:<12} {:>4} {:>6} {:>6} {:>8}",
                    region.name(),
                    region.tag() as char,
                    region.offset(),
                    region.size(),
                    region.payload_size()
                );
            }
        }
    }

    Ok(())
}

fn open_existing(path: &Path) -> Result<FileStore> {
    if !path.exists() {
        return Err(anyhow!("store image {} does not exist", path.display()));
    }
    FileStore::open(path, STORE_SIZE)
}

fn print_region<T>(region: Region, loaded: &Loaded<T>, describe: impl Fn(&T) -> String) {
    match loaded {
        Loaded::Unwritten => println!("{region}: unwritten"),
        Loaded::Corrupt(fault) => println!("{region}: corrupt ({fault})"),
        Loaded::Valid(value) => println!("{region}: {}", describe(value)),
    }
}

fn print_image(store: &FileStore) -> Result<()> {
    let summary = layout::inspect(store)?;
    println!("store={}", store.path().display());

    print_region(Region::Genome, &summary.genome, |evolution| {
        let genome = &evolution.genome;
        format!(
            "generation={} fitness={:.4} accepted={} reverted={} trial_pending={}",
            genome.generation,
            genome.fitness_score,
            genome.success_count,
            genome.failure_count,
            evolution.trial_pending()
        )
    });
    if let Loaded::Valid(evolution) = &summary.genome {
        for param in Param::ALL {
            print_kv(param.name(), evolution.genome.get(param));
        }
    }

    print_region(Region::Strategies, &summary.strategies, |memory| {
        format!("entries={}", memory.len())
    });
    if let Loaded::Valid(memory) = &summary.strategies {
        for (index, entry) in memory.entries().iter().enumerate() {
            println!(
                "  [{index:02}] distance={}mm dir={:?} backup={}ms turn={}ms success={:.2} uses={}",
                entry.context_distance_mm,
                entry.direction,
                entry.backup_ms,
                entry.turn_ms,
                entry.success_rate,
                entry.times_used
            );
        }
    }

    print_region(Region::Metrics, &summary.metrics, |metrics| {
        format!(
            "obstacles={} cleared={} trapped={} escapes={} distance={}mm fastest={}",
            metrics.obstacles_encountered,
            metrics.obstacles_cleared,
            metrics.times_trapped,
            metrics.trap_escapes,
            metrics.total_distance_mm,
            metrics
                .fastest_completion_ms
                .map(|ms| format!("{ms}ms"))
                .unwrap_or_else(|| "none".to_string())
        )
    });

    print_region(Region::Vocabulary, &summary.vocabulary, |vocabulary| {
        format!("words={}", vocabulary.len())
    });
    if let Loaded::Valid(vocabulary) = &summary.vocabulary {
        for (index, word) in vocabulary.words().iter().enumerate() {
            println!(
                "  [{index:02}] {:?} valence={} utility={:.2} uses={} tones={}",
                word.context,
                word.valence,
                word.utility,
                word.times_used,
                word.pattern.len()
            );
        }
    }
    Ok(())
}

fn print_kv(key: &str, value: impl Display) {
    println!("  {key}={value}");
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let encoded = serde_json::to_vec_pretty(value)?;
    fs::write(path, encoded).with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}

fn timestamp_suffix() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{now}")
}
