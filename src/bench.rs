use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::session::{SqlParam, SqlSession};
use crate::util::round3;

/// Derived statistics for one benchmark pass. Immutable after
/// computation; two passes with the same sample count are directly
/// comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub avg_ms: f64,
}

/// Sorts ascending and derives p50/p95/avg. p50 is the element at index
/// floor(n/2), p95 at index ceil(n*0.95)-1, both clamped so any n >= 1
/// stays in bounds.
pub fn summarize(mut samples_ms: Vec<f64>) -> LatencySummary {
    let n = samples_ms.len();
    if n == 0 {
        return LatencySummary {
            samples: 0,
            p50_ms: 0.0,
            p95_ms: 0.0,
            avg_ms: 0.0,
        };
    }
    let avg = samples_ms.iter().sum::<f64>() / n as f64;
    samples_ms.sort_by(f64::total_cmp);
    let p50_idx = (n / 2).min(n - 1);
    let p95_idx = ((n as f64 * 0.95).ceil() as usize)
        .saturating_sub(1)
        .min(n - 1);
    LatencySummary {
        samples: n,
        p50_ms: round3(samples_ms[p50_idx]),
        p95_ms: round3(samples_ms[p95_idx]),
        avg_ms: round3(avg),
    }
}

/// Runs the designated benchmark read `n` times with a random customer
/// id in [1, 20], timing execute-plus-fetch for each sample. The caller
/// supplies the rng so parameter generation stays on the run's seeded
/// stream.
pub async fn sample<S: SqlSession>(
    session: &mut S,
    catalog: &Catalog,
    n: usize,
    rng: &mut StdRng,
) -> Result<LatencySummary> {
    if n == 0 {
        return Err(Error::BenchmarkSetup("sample count must be at least 1".into()));
    }
    let template = catalog.benchmark_read()?;
    let mut samples_ms = Vec::with_capacity(n);
    for _ in 0..n {
        let cid: i32 = rng.random_range(1..=20);
        let start = Instant::now();
        session
            .fetch_all(&template.sql, &[SqlParam::Int(cid)])
            .await?;
        samples_ms.push(start.elapsed().as_secs_f64() * 1000.0);
    }
    let summary = summarize(samples_ms);
    debug!(
        samples = summary.samples,
        p50_ms = summary.p50_ms,
        p95_ms = summary.p95_ms,
        avg_ms = summary.avg_ms,
        "benchmark pass complete"
    );
    Ok(summary)
}
