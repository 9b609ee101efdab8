use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;

use crate::bench::LatencySummary;
use crate::error::{Error, Result};
use crate::util::round2;
use crate::validate::ValidationReport;
use crate::workload::RoundRecord;

/// Per-run connectivity diagnostics. Ping and metadata failures are
/// captured in the artifact, never fatal.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub run_id: String,
    pub ts_utc: String,
    pub ping: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
}

/// Before/after latency percentiles for the designated benchmark read.
#[derive(Debug, Clone, Serialize)]
pub struct PerfComparison {
    pub run_id: String,
    pub ts_utc: String,
    pub benchmark: String,
    pub before_indexes: LatencySummary,
    pub after_indexes: LatencySummary,
}

/// Percentage improvement, or "n/a" when the baseline is not positive.
pub fn improvement_pct(before: f64, after: f64) -> String {
    if before <= 0.0 {
        return "n/a".to_string();
    }
    format!("{}%", round2((before - after) / before * 100.0))
}

/// Persists structured run artifacts under one output directory, all
/// named by the run identifier.
pub struct ReportWriter {
    out_dir: PathBuf,
    run_id: String,
}

impl ReportWriter {
    pub fn new(out_dir: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(out_dir)?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            run_id: run_id.to_string(),
        })
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.out_dir.join(name);
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| Error::Report(format!("serializing {name}: {e}")))?;
        fs::write(&path, body)?;
        info!(path = %path.display(), "artifact written");
        Ok(path)
    }

    pub fn write_diagnostics(&self, diag: &Diagnostics) -> Result<PathBuf> {
        self.write_json(&format!("diagnostics_{}.json", self.run_id), diag)
    }

    /// Tabular and structured workload logs. The CSV is appended to, with
    /// the header written only when the file is new.
    pub fn write_workload(&self, records: &[RoundRecord]) -> Result<(PathBuf, PathBuf)> {
        let csv_path = self.out_dir.join(format!("workload_{}.csv", self.run_id));
        if !records.is_empty() {
            let is_new = !csv_path.exists();
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&csv_path)?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(is_new)
                .from_writer(file);
            for record in records {
                writer
                    .serialize(record)
                    .map_err(|e| Error::Report(format!("writing workload csv: {e}")))?;
            }
            writer
                .flush()
                .map_err(|e| Error::Report(format!("flushing workload csv: {e}")))?;
        }
        let json_path = self.write_json(&format!("workload_{}.json", self.run_id), &records)?;
        Ok((csv_path, json_path))
    }

    /// `id` distinguishes the post-fix snapshot (`{run_id}_after_fix`)
    /// from the primary one.
    pub fn write_validation(&self, id: &str, report: &ValidationReport) -> Result<PathBuf> {
        self.write_json(&format!("validation_{id}.json"), report)
    }

    pub fn write_perf(&self, perf: &PerfComparison) -> Result<(PathBuf, PathBuf)> {
        let json_path = self.write_json(&format!("perf_{}.json", self.run_id), perf)?;
        let md_path = self.out_dir.join(format!("perf_report_{}.md", self.run_id));
        fs::write(&md_path, perf_markdown(perf))?;
        info!(path = %md_path.display(), "artifact written");
        Ok((json_path, md_path))
    }
}

fn perf_markdown(perf: &PerfComparison) -> String {
    let mut out = String::new();
    out.push_str("# Performance Report (Before vs After Indexes)\n\n");
    out.push_str(&format!("- Run: {}\n", perf.run_id));
    out.push_str(&format!("- Generated: {}\n\n", perf.ts_utc));
    out.push_str(&format!("## Benchmark: {}\n\n", perf.benchmark));
    out.push_str("| Metric | Before Indexes (ms) | After Indexes (ms) | Improvement |\n");
    out.push_str("|---|---:|---:|---:|\n");
    let rows = [
        ("p50_ms", perf.before_indexes.p50_ms, perf.after_indexes.p50_ms),
        ("p95_ms", perf.before_indexes.p95_ms, perf.after_indexes.p95_ms),
        ("avg_ms", perf.before_indexes.avg_ms, perf.after_indexes.avg_ms),
    ];
    for (metric, before, after) in rows {
        out.push_str(&format!(
            "| {metric} | {before} | {after} | {} |\n",
            improvement_pct(before, after)
        ));
    }
    out
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(p50: f64, p95: f64, avg: f64) -> LatencySummary {
        LatencySummary {
            samples: 25,
            p50_ms: p50,
            p95_ms: p95,
            avg_ms: avg,
        }
    }

    #[test]
    fn improvement_formula() {
        assert_eq!(improvement_pct(10.0, 5.0), "50%");
        assert_eq!(improvement_pct(3.0, 4.5), "-50%");
        assert_eq!(improvement_pct(8.0, 7.0), "12.5%");
    }

    #[test]
    fn improvement_na_when_baseline_not_positive() {
        assert_eq!(improvement_pct(0.0, 5.0), "n/a");
        assert_eq!(improvement_pct(-1.0, 5.0), "n/a");
    }

    #[test]
    fn markdown_contains_comparison_rows() {
        let perf = PerfComparison {
            run_id: "20260823_120000".into(),
            ts_utc: now_iso(),
            benchmark: "orders_by_customer".into(),
            before_indexes: summary(10.0, 20.0, 12.0),
            after_indexes: summary(5.0, 8.0, 6.0),
        };
        let md = perf_markdown(&perf);
        assert!(md.contains("| p50_ms | 10 | 5 | 50% |"));
        assert!(md.contains("| p95_ms | 20 | 8 | 60% |"));
        assert!(md.contains("## Benchmark: orders_by_customer"));
    }

    #[test]
    fn writer_creates_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), "test_run").unwrap();

        let diag = Diagnostics {
            run_id: "test_run".into(),
            ts_utc: now_iso(),
            ping: "OK".into(),
            ping_error: None,
            server_time: Some("now".into()),
            server_version: None,
        };
        let path = writer.write_diagnostics(&diag).unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("\"ping\": \"OK\""));
        assert!(!body.contains("ping_error"));
    }

    #[test]
    fn workload_csv_appends_header_once() {
        use crate::workload::{OpType, RoundStatus};

        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path(), "run1").unwrap();
        let record = RoundRecord {
            run_id: "run1".into(),
            ts_utc: now_iso(),
            op_index: 0,
            op_type: OpType::Write,
            op_name: "insert_customer".into(),
            elapsed_ms: 2.5,
            status: RoundStatus::Ok,
            error: String::new(),
        };
        let (csv_path, _) = writer.write_workload(std::slice::from_ref(&record)).unwrap();
        writer.write_workload(std::slice::from_ref(&record)).unwrap();

        let body = std::fs::read_to_string(csv_path).unwrap();
        let header_count = body.lines().filter(|l| l.starts_with("run_id")).count();
        assert_eq!(header_count, 1);
        assert_eq!(body.lines().count(), 3);
    }
}
