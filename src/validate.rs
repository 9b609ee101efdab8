use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::schema::split_statements;
use crate::session::SqlSession;

/// Ordered check results. Each check contributes the first row of its
/// result set as (column, integer value) pairs; a check with no rows
/// contributes an empty map. Columns that did not parse as integers are
/// recorded as null and ignored by [`ValidationReport::any_failing`].
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    pub checks: BTreeMap<String, BTreeMap<String, Option<i64>>>,
}

impl ValidationReport {
    /// True if any integer value across any check row is greater than
    /// zero. Violations are expected data, not an error condition.
    pub fn any_failing(&self) -> bool {
        self.checks
            .values()
            .flat_map(|row| row.values())
            .any(|v| matches!(v, Some(n) if *n > 0))
    }
}

/// Executes the check battery in order. Each statement is expected to
/// return one row of violation counts. A check that fails to EXECUTE is
/// an error, distinct from a check that ran and reported violations.
pub async fn run_checks<S: SqlSession>(session: &mut S, payload: &str) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();
    for (idx, stmt) in split_statements(payload).iter().enumerate() {
        let check_id = format!("T{}", idx + 1);
        let row = session
            .fetch_numeric_row(stmt)
            .await
            .map_err(|e| Error::Validation {
                check: check_id.clone(),
                message: e.to_string(),
            })?;
        report.checks.insert(check_id, row.into_iter().collect());
    }
    info!(
        checks = report.checks.len(),
        failing = report.any_failing(),
        "validation battery complete"
    );
    Ok(report)
}
