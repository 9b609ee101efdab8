use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use loadcell::config::{ConnSettings, RunSettings, Scenario};
use loadcell::runner;

/// Synthetic SQL workload driver and index-impact benchmark.
#[derive(Parser, Debug)]
#[command(name = "loadcell", version, about)]
struct Cli {
    /// Workload size profile (affects round count).
    #[arg(long, value_enum, default_value = "regression")]
    scenario: Scenario,

    /// Explicit round count, overriding the scenario mapping.
    #[arg(long)]
    rounds: Option<u64>,

    /// Inject an intentional defect (negative order total) before the run.
    #[arg(long)]
    inject_defect: bool,

    /// Apply the fix batch (CHECK constraint) and re-run validations.
    #[arg(long)]
    apply_fix: bool,

    /// Override the READ ratio (0.0 - 1.0).
    #[arg(long)]
    read_ratio: Option<f64>,

    /// Seed for the operation and parameter streams.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Samples per benchmark pass.
    #[arg(long, default_value_t = 25)]
    samples: usize,

    /// Concurrent workload workers, each with its own connection.
    /// Benchmark passes always run on a single session.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Directory holding the SQL payload files.
    #[arg(long, default_value = "sql")]
    sql_dir: PathBuf,

    /// Directory for run artifacts.
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loadcell=info"));
    let fmt_layer = fmt::layer().with_target(false);
    Registry::default().with(env_filter).with(fmt_layer).init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let settings = RunSettings {
        scenario: cli.scenario,
        rounds_override: cli.rounds,
        read_ratio_override: cli.read_ratio,
        seed: cli.seed,
        samples: cli.samples,
        workers: cli.workers,
        inject_defect: cli.inject_defect,
        apply_fix: cli.apply_fix,
        sql_dir: cli.sql_dir,
        out_dir: cli.out_dir,
        ..RunSettings::default()
    };

    let conn = match ConnSettings::from_env() {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, "invalid connection settings");
            std::process::exit(1);
        }
    };

    match runner::run(&conn, &settings).await {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                rounds = report.rounds,
                failed_rounds = report.failed_rounds,
                validation_failed = report.validation_failed,
                fix_verified = ?report.fix_verified,
                "workload completed successfully"
            );
        }
        Err(e) => {
            error!(error = %e, "run aborted");
            std::process::exit(1);
        }
    }
}
