use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::{debug, info, warn};

use crate::config::ConnSettings;
use crate::error::{Error, Result};

/// Positional statement parameter. Identifier columns are 32-bit on the
/// wire, money columns are double precision.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i32),
    Float(f64),
    Text(String),
}

impl SqlParam {
    fn as_pg(&self) -> &(dyn ToSql + Sync) {
        match self {
            SqlParam::Int(v) => v,
            SqlParam::Float(v) => v,
            SqlParam::Text(v) => v,
        }
    }
}

/// The single seam between the orchestration logic and the database.
/// Fetch variants consume the full result set so the cost of the fetch
/// is part of whatever the caller is timing.
#[async_trait]
pub trait SqlSession: Send {
    /// Executes a statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64>;

    /// Executes a query and drains all rows, returning how many were fetched.
    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize>;

    /// First column of the first row as an integer, if any row came back.
    async fn fetch_i64(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>>;

    /// First column of the first row as a double, if any row came back.
    async fn fetch_f64(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<f64>>;

    /// First column of the first row as text, if any row came back.
    async fn fetch_text(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<String>>;

    /// First row as (column name, integer value) pairs. Columns that do
    /// not hold an integer map to None and are ignored by callers.
    async fn fetch_numeric_row(&mut self, sql: &str) -> Result<Vec<(String, Option<i64>)>>;
}

/// Live session over a single `tokio-postgres` connection.
pub struct PgSession {
    client: tokio_postgres::Client,
}

impl PgSession {
    /// One connection attempt. Callers wanting the retry policy go
    /// through [`connect_with_retry`].
    pub async fn connect(settings: &ConnSettings) -> std::result::Result<Self, String> {
        let (client, connection) = tokio_postgres::connect(&settings.pg_config(), NoTls)
            .await
            .map_err(|e| e.to_string())?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "connection task terminated");
            }
        });
        Ok(Self { client })
    }
}

#[async_trait]
impl SqlSession for PgSession {
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let args: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlParam::as_pg).collect();
        self.client
            .execute(sql, &args)
            .await
            .map_err(|e| Error::Operation(e.to_string()))
    }

    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize> {
        let args: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlParam::as_pg).collect();
        let rows = self
            .client
            .query(sql, &args)
            .await
            .map_err(|e| Error::Operation(e.to_string()))?;
        Ok(rows.len())
    }

    async fn fetch_i64(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>> {
        let args: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlParam::as_pg).collect();
        let rows = self
            .client
            .query(sql, &args)
            .await
            .map_err(|e| Error::Operation(e.to_string()))?;
        match rows.first() {
            Some(row) => row
                .try_get::<_, i64>(0)
                .map(Some)
                .map_err(|e| Error::Operation(e.to_string())),
            None => Ok(None),
        }
    }

    async fn fetch_f64(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<f64>> {
        let args: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlParam::as_pg).collect();
        let rows = self
            .client
            .query(sql, &args)
            .await
            .map_err(|e| Error::Operation(e.to_string()))?;
        match rows.first() {
            Some(row) => row
                .try_get::<_, f64>(0)
                .map(Some)
                .map_err(|e| Error::Operation(e.to_string())),
            None => Ok(None),
        }
    }

    async fn fetch_text(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<String>> {
        let args: Vec<&(dyn ToSql + Sync)> = params.iter().map(SqlParam::as_pg).collect();
        let rows = self
            .client
            .query(sql, &args)
            .await
            .map_err(|e| Error::Operation(e.to_string()))?;
        match rows.first() {
            Some(row) => row
                .try_get::<_, String>(0)
                .map(Some)
                .map_err(|e| Error::Operation(e.to_string())),
            None => Ok(None),
        }
    }

    async fn fetch_numeric_row(&mut self, sql: &str) -> Result<Vec<(String, Option<i64>)>> {
        let rows = self
            .client
            .query(sql, &[])
            .await
            .map_err(|e| Error::Operation(e.to_string()))?;
        let Some(row) = rows.first() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(row.columns().len());
        for (idx, col) in row.columns().iter().enumerate() {
            let value = row
                .try_get::<_, i64>(idx)
                .ok()
                .or_else(|| row.try_get::<_, i32>(idx).ok().map(i64::from));
            out.push((col.name().to_string(), value));
        }
        Ok(out)
    }
}

/// Fast, non-gating reachability probe. A closed port before the first
/// connect attempt usually means the database container is still starting.
pub async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Retries `connector` up to `retries` times with a fixed sleep between
/// attempts. Generic over the connector so the policy is testable
/// without a live server.
pub async fn connect_with_retry<S, F, Fut>(
    mut connector: F,
    retries: usize,
    backoff: Duration,
) -> Result<S>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<S, String>>,
{
    let mut last = String::from("no attempts made");
    for attempt in 1..=retries {
        match connector().await {
            Ok(session) => {
                info!(attempt, "database connection established");
                return Ok(session);
            }
            Err(e) => {
                warn!(attempt, error = %e, "connection attempt failed");
                last = e;
                if attempt < retries {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(Error::Connection {
        attempts: retries,
        last,
    })
}
