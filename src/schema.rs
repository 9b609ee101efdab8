use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};
use crate::session::SqlSession;
use crate::util::truncate_chars;

const STATEMENT_PREVIEW_LEN: usize = 90;

/// Splits a SQL payload on the statement terminator, trimming whitespace
/// and dropping empty fragments. Order is preserved.
pub fn split_statements(payload: &str) -> Vec<String> {
    payload
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads one SQL payload file from the payload directory.
pub fn load_payload(dir: &Path, name: &str) -> Result<String> {
    Ok(fs::read_to_string(dir.join(name))?)
}

/// Executes a payload statement by statement, in order. With
/// `stop_on_error` the first failure propagates; otherwise failures are
/// logged and the batch continues.
pub async fn apply_batch<S: SqlSession>(
    session: &mut S,
    payload: &str,
    stop_on_error: bool,
) -> Result<()> {
    for stmt in split_statements(payload) {
        if let Err(e) = session.execute(&stmt, &[]).await {
            if stop_on_error {
                return Err(Error::Schema {
                    statement: truncate_chars(&stmt, STATEMENT_PREVIEW_LEN),
                    message: e.to_string(),
                });
            }
            warn!(
                statement = %truncate_chars(&stmt, STATEMENT_PREVIEW_LEN),
                error = %e,
                "schema statement failed, continuing"
            );
        }
    }
    Ok(())
}
