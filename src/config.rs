use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::ValueEnum;

use crate::error::{Error, Result};

/// Connection parameters for the target database, sourced from the
/// environment so credentials never live in the binary or its arguments.
#[derive(Debug, Clone)]
pub struct ConnSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl ConnSettings {
    pub fn from_env() -> Result<Self> {
        let port_raw = env_or("DB_PORT", "5432");
        let port = port_raw
            .parse::<u16>()
            .map_err(|_| Error::Config(format!("invalid DB_PORT value: {port_raw}")))?;
        Ok(Self {
            host: env_or("DB_HOST", "127.0.0.1"),
            port,
            dbname: env_or("DB_NAME", "workload"),
            user: env_or("DB_USER", "postgres"),
            password: env_or("DB_PASSWORD", "postgres"),
        })
    }

    /// Renders a `tokio-postgres` configuration string.
    pub fn pg_config(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.user, self.password, self.dbname
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Workload size profile. Each scenario maps to a fixed round count;
/// an explicit round override always wins over the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    Smoke,
    Regression,
    Stress,
}

impl Scenario {
    pub fn rounds(self) -> u64 {
        match self {
            Scenario::Smoke => 15,
            Scenario::Regression => 80,
            Scenario::Stress => 300,
        }
    }
}

/// Resolves the effective round count: explicit override, then the
/// WORKLOAD_ROUNDS environment variable, then the scenario mapping.
pub fn resolve_rounds(scenario: Scenario, override_rounds: Option<u64>) -> u64 {
    if let Some(n) = override_rounds {
        return n;
    }
    if let Ok(raw) = env::var("WORKLOAD_ROUNDS") {
        if let Ok(n) = raw.parse::<u64>() {
            return n;
        }
    }
    scenario.rounds()
}

/// Resolves the effective read ratio, clamped to [0, 1]: explicit
/// override, then the READ_RATIO environment variable, then 0.70.
pub fn resolve_read_ratio(override_ratio: Option<f64>) -> f64 {
    let ratio = override_ratio
        .or_else(|| env::var("READ_RATIO").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(0.70);
    ratio.clamp(0.0, 1.0)
}

/// Everything a single invocation needs beyond the connection itself.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub scenario: Scenario,
    pub rounds_override: Option<u64>,
    pub read_ratio_override: Option<f64>,
    pub seed: u64,
    pub samples: usize,
    pub workers: usize,
    pub inject_defect: bool,
    pub apply_fix: bool,
    pub sql_dir: PathBuf,
    pub out_dir: PathBuf,
    pub connect_retries: usize,
    pub connect_backoff: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            scenario: Scenario::Regression,
            rounds_override: None,
            read_ratio_override: None,
            seed: 7,
            samples: 25,
            workers: 1,
            inject_defect: false,
            apply_fix: false,
            sql_dir: PathBuf::from("sql"),
            out_dir: PathBuf::from("out"),
            connect_retries: 90,
            connect_backoff: Duration::from_secs(5),
        }
    }
}

/// Correlation handle threading one run identifier through every artifact.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
