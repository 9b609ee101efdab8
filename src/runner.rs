use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::bench;
use crate::catalog::Catalog;
use crate::config::{resolve_read_ratio, resolve_rounds, ConnSettings, RunContext, RunSettings};
use crate::error::Result;
use crate::report::{now_iso, Diagnostics, PerfComparison, ReportWriter};
use crate::schema::{apply_batch, load_payload};
use crate::session::{connect_with_retry, probe_tcp, PgSession, SqlSession};
use crate::validate::{run_checks, ValidationReport};
use crate::workload::{run_workers, DriverConfig, RoundRecord, RoundStatus};

const PING_SQL: &str = "SELECT now()::text";
const VERSION_SQL: &str = "SELECT version()";

const DROP_PAYLOAD: &str = "00_drop.sql";
const CREATE_PAYLOAD: &str = "01_create.sql";
const SEED_PAYLOAD: &str = "02_seed.sql";
const INDEX_PAYLOAD: &str = "03_indexes.sql";
const FIX_PAYLOAD: &str = "04_fix_constraints.sql";
const DEFECT_PAYLOAD: &str = "05_defect_injection.sql";
const READ_QUERIES: &str = "read_queries.sql";
const WRITE_QUERIES: &str = "write_queries.sql";
const VALIDATE_PAYLOAD: &str = "validate.sql";

/// Summary of one full invocation, for callers and the process log.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub rounds: usize,
    pub failed_rounds: usize,
    pub validation_failed: bool,
    pub fix_verified: Option<bool>,
}

/// Full control flow: connect -> diagnostics -> schema -> optional
/// defect -> benchmark before -> bulk workload -> validation -> indexes
/// -> benchmark after -> optional fix + re-validation. Artifacts flush
/// as each phase completes, so a fatal failure still leaves everything
/// produced up to that point.
pub async fn run(conn: &ConnSettings, settings: &RunSettings) -> Result<RunReport> {
    let ctx = RunContext::new();
    let run_id = ctx.run_id.clone();

    if !probe_tcp(&conn.host, conn.port, Duration::from_secs(2)).await {
        warn!(
            host = %conn.host,
            port = conn.port,
            "TCP port not open yet, database may still be starting"
        );
    }

    info!("connecting to database");
    let mut session = connect_with_retry(
        || PgSession::connect(conn),
        settings.connect_retries,
        settings.connect_backoff,
    )
    .await?;
    info!("connected");

    let writer = ReportWriter::new(&settings.out_dir, &run_id)?;
    let diag = gather_diagnostics(&mut session, &run_id).await;
    writer.write_diagnostics(&diag)?;

    info!("applying schema");
    apply_batch(&mut session, &load_payload(&settings.sql_dir, DROP_PAYLOAD)?, false).await?;
    apply_batch(&mut session, &load_payload(&settings.sql_dir, CREATE_PAYLOAD)?, true).await?;
    apply_batch(&mut session, &load_payload(&settings.sql_dir, SEED_PAYLOAD)?, true).await?;
    info!("schema and seed complete");

    if settings.inject_defect {
        info!("injecting defect");
        apply_batch(&mut session, &load_payload(&settings.sql_dir, DEFECT_PAYLOAD)?, true).await?;
    }

    let catalog = Arc::new(Catalog::load(
        &load_payload(&settings.sql_dir, READ_QUERIES)?,
        &load_payload(&settings.sql_dir, WRITE_QUERIES)?,
    )?);

    let rounds = resolve_rounds(settings.scenario, settings.rounds_override);
    let read_ratio = resolve_read_ratio(settings.read_ratio_override);
    let mut rng = StdRng::seed_from_u64(settings.seed);

    info!("benchmark pass before indexes");
    let before = bench::sample(&mut session, &catalog, settings.samples, &mut rng).await?;

    info!(
        scenario = ?settings.scenario,
        rounds,
        read_ratio,
        workers = settings.workers,
        "running workload"
    );
    let records = run_workload(conn, session, &catalog, settings, &run_id, read_ratio, rounds).await?;
    writer.write_workload(&records)?;
    let failed_rounds = records
        .iter()
        .filter(|r| r.status == RoundStatus::Fail)
        .count();

    // The workload phase may have consumed the session (multi-worker
    // path), so validation and the remaining phases get a fresh one.
    let mut session = connect_with_retry(
        || PgSession::connect(conn),
        settings.connect_retries,
        settings.connect_backoff,
    )
    .await?;

    let check_payload = load_payload(&settings.sql_dir, VALIDATE_PAYLOAD)?;
    let validation = run_checks(&mut session, &check_payload).await?;
    writer.write_validation(&run_id, &validation)?;
    let validation_failed = validation.any_failing();

    info!("applying indexes");
    apply_batch(&mut session, &load_payload(&settings.sql_dir, INDEX_PAYLOAD)?, true).await?;

    info!("benchmark pass after indexes");
    let after = bench::sample(&mut session, &catalog, settings.samples, &mut rng).await?;

    let perf = PerfComparison {
        run_id: run_id.clone(),
        ts_utc: now_iso(),
        benchmark: catalog.benchmark_read()?.name.to_string(),
        before_indexes: before,
        after_indexes: after,
    };
    writer.write_perf(&perf)?;

    let fix_verified = if settings.apply_fix {
        Some(
            verify_fix(&mut session, settings, &writer, &run_id, &check_payload, validation_failed)
                .await?,
        )
    } else {
        None
    };

    info!(run_id = %run_id, rounds = records.len(), failed_rounds, "workload run complete");
    Ok(RunReport {
        run_id,
        rounds: records.len(),
        failed_rounds,
        validation_failed,
        fix_verified,
    })
}

async fn run_workload(
    conn: &ConnSettings,
    session: PgSession,
    catalog: &Arc<Catalog>,
    settings: &RunSettings,
    run_id: &str,
    read_ratio: f64,
    rounds: u64,
) -> Result<Vec<RoundRecord>> {
    let workers = settings.workers.max(1);
    let mut sessions = vec![session];
    for _ in 1..workers {
        sessions.push(
            connect_with_retry(
                || PgSession::connect(conn),
                settings.connect_retries,
                settings.connect_backoff,
            )
            .await?,
        );
    }
    let config = DriverConfig {
        run_id: run_id.to_string(),
        read_ratio,
        seed: settings.seed,
    };
    run_workers(sessions, Arc::clone(catalog), config, rounds).await
}

/// Fix verification is a soft advisory: a FAIL-to-PASS transition logs
/// PASS, anything else logs the outcome for review. It never aborts.
async fn verify_fix<S: SqlSession>(
    session: &mut S,
    settings: &RunSettings,
    writer: &ReportWriter,
    run_id: &str,
    check_payload: &str,
    failed_before: bool,
) -> Result<bool> {
    info!("applying fix batch");
    apply_batch(session, &load_payload(&settings.sql_dir, FIX_PAYLOAD)?, true).await?;

    info!("re-running validations after fix");
    let fix_results: ValidationReport = run_checks(session, check_payload).await?;
    writer.write_validation(&format!("{run_id}_after_fix"), &fix_results)?;
    let failing_after = fix_results.any_failing();

    let verified = failed_before && !failing_after;
    if verified {
        info!("fix verification PASS, validations improved from FAIL to PASS");
    } else {
        info!(
            failed_before,
            failing_after, "fix verification complete, review validation artifacts"
        );
    }
    Ok(verified)
}

async fn gather_diagnostics<S: SqlSession>(session: &mut S, run_id: &str) -> Diagnostics {
    let mut diag = Diagnostics {
        run_id: run_id.to_string(),
        ts_utc: now_iso(),
        ping: "OK".to_string(),
        ping_error: None,
        server_time: None,
        server_version: None,
    };
    match session.fetch_text(PING_SQL, &[]).await {
        Ok(t) => diag.server_time = t,
        Err(e) => {
            diag.ping = "FAIL".to_string();
            diag.ping_error = Some(crate::util::truncate_chars(&e.to_string(), 250));
        }
    }
    // Metadata may be unavailable depending on server edition/permissions.
    if let Ok(v) = session.fetch_text(VERSION_SQL, &[]).await {
        diag.server_version = v;
    }
    diag
}
