//! Workload simulator for the background statistics scheduler.
//!
//! Spins up an in-memory catalog, hammers it with concurrent writers while
//! dropping some tables, then prints the scheduler counters as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use stats_recalc::{
    Catalog, RecalcMode, SessionContext, StatsBackground, StatsConfig, StatsEngine, StatsError,
    StatsTable, TableId,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Background statistics recalculation simulator
#[derive(Parser, Debug)]
#[command(name = "stats_recalc_sim")]
#[command(about = "Drive the statistics scheduler with a synthetic write workload")]
struct Args {
    /// TOML config file
    #[arg(long, env = "STATS_RECALC_CONFIG")]
    config: Option<PathBuf>,

    /// Override min_recalc_interval_ms from the config
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Number of tables
    #[arg(long, default_value_t = 32)]
    tables: u64,

    /// Rows per table
    #[arg(long, default_value_t = 1_000)]
    rows: u64,

    /// Concurrent writer threads
    #[arg(long, default_value_t = 4)]
    writers: u64,

    /// Row writes per writer
    #[arg(long, default_value_t = 20_000)]
    writes: u64,

    /// Tables dropped while the writers run
    #[arg(long, default_value_t = 4)]
    drops: u64,

    /// Simulated cost of one persistent recalculation
    #[arg(long, default_value_t = 5)]
    recalc_ms: u64,

    /// Time to let the worker drain the pool after the writers finish
    #[arg(long, default_value_t = 500)]
    settle_ms: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

/// Engine that sleeps instead of sampling, and gives up early when a drop
/// is waiting.
struct SimEngine {
    cost: Duration,
}

impl StatsEngine for SimEngine {
    fn recompute(&self, table: &StatsTable, mode: RecalcMode) -> Result<(), StatsError> {
        if mode == RecalcMode::Persistent {
            let step = Duration::from_millis(1);
            let mut spent = Duration::ZERO;
            while spent < self.cost {
                if table.should_quit() {
                    return Err(StatsError::Engine(format!(
                        "recalculation of {} abandoned for drop",
                        table.name()
                    )));
                }
                std::thread::sleep(step);
                spent += step;
            }
        }
        table.record_recalc(Utc::now());
        Ok(())
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn load_config(args: &Args) -> Result<StatsConfig, StatsError> {
    let mut config = match &args.config {
        Some(path) => StatsConfig::from_file(path)?,
        None => StatsConfig::default(),
    };
    if let Some(interval) = args.interval_ms {
        config.min_recalc_interval_ms = interval;
    }
    Ok(config)
}

fn run(args: &Args) -> Result<(), StatsError> {
    let config = load_config(args)?;
    info!(?config, "stats_recalc_sim: starting");

    let engine = Arc::new(SimEngine {
        cost: Duration::from_millis(args.recalc_ms),
    });
    let stats = StatsBackground::builder(Arc::new(Catalog::new()), engine)
        .config(config)
        .build()?;
    stats.init();
    stats.start()?;

    for raw in 0..args.tables {
        stats
            .catalog()
            .create_table(StatsTable::new(TableId::new(raw), format!("t{raw}")).with_rows(args.rows));
    }

    std::thread::scope(|s| {
        for writer in 0..args.writers {
            let stats = &stats;
            s.spawn(move || {
                let session = SessionContext::new(writer);
                for i in 0..args.writes {
                    let id = TableId::new((writer + i) % args.tables.max(1));
                    let Some(table) = stats.catalog().lock().get(id) else {
                        continue;
                    };
                    if let Err(e) = stats.notify_write(&table, &session) {
                        warn!(table_id = id.get(), error = %e, "stats_recalc_sim: write hook failed");
                    }
                }
            });
        }

        let stats = &stats;
        s.spawn(move || {
            let step = args.tables.checked_div(args.drops).unwrap_or(0).max(1);
            for n in 0..args.drops.min(args.tables) {
                std::thread::sleep(Duration::from_millis(20));
                let id = TableId::new(n * step);
                if stats.drop_table(id).is_some() {
                    info!(table_id = id.get(), "stats_recalc_sim: table dropped");
                }
            }
        });
    });

    std::thread::sleep(Duration::from_millis(args.settle_ms));
    stats.shutdown();
    println!("{}", stats.metrics().to_json());
    stats.deinit();
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.json_logs);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("stats_recalc_sim: {e} ({})", e.kind());
            ExitCode::FAILURE
        }
    }
}
