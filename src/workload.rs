use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{Catalog, OpKind};
use crate::error::{Error, Result};
use crate::session::{SqlParam, SqlSession};
use crate::util::{round2, round3, truncate_chars};

const CITIES: [&str; 5] = [
    "San Jose",
    "San Francisco",
    "Oakland",
    "Fremont",
    "Sunnyvale",
];
const STATUSES: [&str; 3] = ["NEW", "PAID", "CANCELLED"];

const PRODUCT_PRICE_SQL: &str = "SELECT price FROM products WHERE product_id = $1";
const LAST_IDENTITY_SQL: &str = "SELECT lastval() AS last_id";

const ERROR_TRUNCATE_LEN: usize = 250;
const RECENT_ORDERS_CAP: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpType {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoundStatus {
    Ok,
    Fail,
}

/// One executed round, append-only. A failed round carries a truncated
/// error message instead of aborting the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub run_id: String,
    pub ts_utc: String,
    pub op_index: u64,
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub op_name: String,
    pub elapsed_ms: f64,
    pub status: RoundStatus,
    pub error: String,
}

/// Per-driver configuration. Each worker derives its own seed from the
/// base so concurrent drivers produce independent but reproducible
/// operation streams.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub run_id: String,
    pub read_ratio: f64,
    pub seed: u64,
}

/// The main loop: picks read or write per round, supplies randomized
/// parameters, executes, and records latency and outcome. Owns its rng
/// and its bounded buffer of recently created order ids; nothing is
/// shared across driver instances.
pub struct WorkloadDriver {
    catalog: Arc<Catalog>,
    run_id: String,
    read_ratio: f64,
    rng: StdRng,
    recent_orders: VecDeque<i64>,
}

impl WorkloadDriver {
    pub fn new(catalog: Arc<Catalog>, config: DriverConfig) -> Self {
        Self {
            catalog,
            run_id: config.run_id,
            read_ratio: config.read_ratio.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(config.seed),
            recent_orders: VecDeque::with_capacity(RECENT_ORDERS_CAP),
        }
    }

    /// Executes one round. Dispatch failures are captured in the record,
    /// never propagated; the loop always continues.
    pub async fn run_round<S: SqlSession>(&mut self, session: &mut S, op_index: u64) -> RoundRecord {
        let is_read = self.rng.random::<f64>() < self.read_ratio;
        let op_type = if is_read { OpType::Read } else { OpType::Write };
        let start = Instant::now();
        let outcome = if is_read {
            self.read_round(session).await
        } else {
            self.write_round(session, op_index).await
        };
        let elapsed_ms = round3(start.elapsed().as_secs_f64() * 1000.0);
        match outcome {
            Ok(name) => {
                debug!(op_index, op = name, elapsed_ms, "round complete");
                RoundRecord {
                    run_id: self.run_id.clone(),
                    ts_utc: now_iso(),
                    op_index,
                    op_type,
                    op_name: name.to_string(),
                    elapsed_ms,
                    status: RoundStatus::Ok,
                    error: String::new(),
                }
            }
            Err(e) => {
                debug!(op_index, error = %e, elapsed_ms, "round failed");
                RoundRecord {
                    run_id: self.run_id.clone(),
                    ts_utc: now_iso(),
                    op_index,
                    op_type,
                    op_name: "unknown".to_string(),
                    elapsed_ms,
                    status: RoundStatus::Fail,
                    error: truncate_chars(&e.to_string(), ERROR_TRUNCATE_LEN),
                }
            }
        }
    }

    /// Drives `count` rounds starting at `start_index`.
    pub async fn run<S: SqlSession>(
        &mut self,
        session: &mut S,
        start_index: u64,
        count: u64,
    ) -> Vec<RoundRecord> {
        let mut records = Vec::with_capacity(count as usize);
        for i in 0..count {
            records.push(self.run_round(session, start_index + i).await);
        }
        records
    }

    async fn read_round<S: SqlSession>(&mut self, session: &mut S) -> Result<&'static str> {
        let template = self.catalog.pick_read(&mut self.rng).clone();
        let params = if template.kind == OpKind::OrdersByCustomer {
            vec![SqlParam::Int(self.rng.random_range(1..=20))]
        } else {
            Vec::new()
        };
        session.fetch_all(&template.sql, &params).await?;
        Ok(template.name)
    }

    async fn write_round<S: SqlSession>(
        &mut self,
        session: &mut S,
        op_index: u64,
    ) -> Result<&'static str> {
        let template = self.catalog.pick_write(&mut self.rng).clone();
        match template.kind {
            OpKind::InsertCustomer => {
                let full_name = format!("User {}", self.rng.random_range(1000..=9999));
                let email = format!("user{}@example.com", self.rng.random_range(100_000..=999_999));
                let city = *CITIES.choose(&mut self.rng).unwrap_or(&CITIES[0]);
                session
                    .execute(
                        &template.sql,
                        &[
                            SqlParam::Text(full_name),
                            SqlParam::Text(email.clone()),
                            SqlParam::Text(city.to_string()),
                        ],
                    )
                    .await?;
                self.append_audit(session, "WRITE", &format!("Inserted customer {email}"))
                    .await?;
                Ok(template.name)
            }
            OpKind::InsertOrder => {
                let customer_id: i32 = self.rng.random_range(1..=10);
                let status = *STATUSES.choose(&mut self.rng).unwrap_or(&STATUSES[0]);
                let total = round2(self.rng.random_range(10.0..500.0));
                session
                    .execute(
                        &template.sql,
                        &[
                            SqlParam::Int(customer_id),
                            SqlParam::Text(status.to_string()),
                            SqlParam::Float(total),
                        ],
                    )
                    .await?;

                let order_id = session
                    .fetch_i64(LAST_IDENTITY_SQL, &[])
                    .await?
                    .ok_or_else(|| Error::Operation("last identity query returned no rows".into()))?;
                self.remember_order(order_id);

                let item_template = self
                    .catalog
                    .find(OpKind::InsertOrderItem)
                    .ok_or_else(|| Error::Operation("no order-item template in catalog".into()))?
                    .clone();
                let items = self.rng.random_range(1..=3);
                for _ in 0..items {
                    let product_id: i32 = self.rng.random_range(1..=6);
                    let quantity: i32 = self.rng.random_range(1..=5);
                    let unit_price = session
                        .fetch_f64(PRODUCT_PRICE_SQL, &[SqlParam::Int(product_id)])
                        .await?
                        .ok_or_else(|| {
                            Error::Operation(format!("no price for product {product_id}"))
                        })?;
                    session
                        .execute(
                            &item_template.sql,
                            &[
                                SqlParam::Int(order_id as i32),
                                SqlParam::Int(product_id),
                                SqlParam::Int(quantity),
                                SqlParam::Float(unit_price),
                            ],
                        )
                        .await?;
                }
                self.append_audit(
                    session,
                    "WRITE",
                    &format!("Inserted order {order_id} with {items} items"),
                )
                .await?;
                Ok(template.name)
            }
            OpKind::UpdateOrderStatus => {
                let order_id = if self.recent_orders.is_empty() {
                    i64::from(self.rng.random_range(1..=10))
                } else {
                    self.recent_orders[self.rng.random_range(0..self.recent_orders.len())]
                };
                let status = *STATUSES.choose(&mut self.rng).unwrap_or(&STATUSES[0]);
                session
                    .execute(
                        &template.sql,
                        &[
                            SqlParam::Text(status.to_string()),
                            SqlParam::Int(order_id as i32),
                        ],
                    )
                    .await?;
                self.append_audit(
                    session,
                    "WRITE",
                    &format!("Updated order {order_id} to {status}"),
                )
                .await?;
                Ok(template.name)
            }
            // Anything else (the standalone order-item template, audit
            // template, unrecognized writes) degrades to a no-op audit entry.
            _ => {
                self.append_audit(session, "INFO", &format!("noop event {op_index}"))
                    .await?;
                Ok(OpKind::AuditAppend.label())
            }
        }
    }

    async fn append_audit<S: SqlSession>(
        &mut self,
        session: &mut S,
        level: &str,
        message: &str,
    ) -> Result<()> {
        let Some(audit) = self.catalog.find(OpKind::AuditAppend) else {
            debug!("no audit template in catalog, skipping audit append");
            return Ok(());
        };
        session
            .execute(
                &audit.sql,
                &[
                    SqlParam::Text(level.to_string()),
                    SqlParam::Text(message.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    fn remember_order(&mut self, order_id: i64) {
        if self.recent_orders.len() == RECENT_ORDERS_CAP {
            self.recent_orders.pop_front();
        }
        self.recent_orders.push_back(order_id);
    }

    #[cfg(test)]
    fn recent_order_count(&self) -> usize {
        self.recent_orders.len()
    }
}

/// Runs the bulk workload across `sessions.len()` workers, each with its
/// own connection, driver instance and derived seed. Round indices are
/// partitioned contiguously; the merged log is sorted back into global
/// order. With one session this degenerates to the sequential loop.
pub async fn run_workers<S>(
    sessions: Vec<S>,
    catalog: Arc<Catalog>,
    config: DriverConfig,
    rounds: u64,
) -> Result<Vec<RoundRecord>>
where
    S: SqlSession + 'static,
{
    let workers = sessions.len() as u64;
    if workers == 0 {
        return Err(Error::Config("at least one worker session required".into()));
    }
    let base = rounds / workers;
    let rem = rounds % workers;

    let mut handles = Vec::with_capacity(sessions.len());
    let mut start_index = 0u64;
    for (w, mut session) in sessions.into_iter().enumerate() {
        let count = base + u64::from((w as u64) < rem);
        let worker_config = DriverConfig {
            run_id: config.run_id.clone(),
            read_ratio: config.read_ratio,
            seed: config.seed.wrapping_add(w as u64 + 1),
        };
        let catalog = Arc::clone(&catalog);
        let start = start_index;
        start_index += count;
        handles.push(tokio::spawn(async move {
            let mut driver = WorkloadDriver::new(catalog, worker_config);
            driver.run(&mut session, start, count).await
        }));
    }

    let mut records = Vec::with_capacity(rounds as usize);
    for handle in handles {
        let worker_records = handle
            .await
            .map_err(|e| Error::Operation(format!("worker task failed: {e}")))?;
        records.extend(worker_records);
    }
    records.sort_by_key(|r| r.op_index);
    info!(rounds = records.len(), "workload phase complete");
    Ok(records)
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
