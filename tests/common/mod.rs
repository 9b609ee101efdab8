#![allow(dead_code)]

use std::collections::VecDeque;

use async_trait::async_trait;
use loadcell::error::{Error, Result};
use loadcell::session::{SqlParam, SqlSession};

/// In-memory stand-in for a live database session. Records every
/// statement it sees, hands out incrementing identity values, and can be
/// told to fail statements containing a marker substring.
pub struct FakeSession {
    pub executed: Vec<(String, Vec<SqlParam>)>,
    pub fail_marker: Option<String>,
    pub fail_message: String,
    pub rows_per_fetch: usize,
    pub numeric_responses: VecDeque<Vec<(String, Option<i64>)>>,
    next_identity: i64,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            executed: Vec::new(),
            fail_marker: None,
            fail_message: "forced failure".to_string(),
            rows_per_fetch: 3,
            numeric_responses: VecDeque::new(),
            next_identity: 1000,
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::new()
        }
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        if let Some(marker) = &self.fail_marker {
            if sql.contains(marker.as_str()) {
                return Err(Error::Operation(self.fail_message.clone()));
            }
        }
        Ok(())
    }

    fn record(&mut self, sql: &str, params: &[SqlParam]) {
        self.executed.push((sql.to_string(), params.to_vec()));
    }
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SqlSession for FakeSession {
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        self.check_failure(sql)?;
        self.record(sql, params);
        Ok(1)
    }

    async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize> {
        self.check_failure(sql)?;
        self.record(sql, params);
        Ok(self.rows_per_fetch)
    }

    async fn fetch_i64(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>> {
        self.check_failure(sql)?;
        self.record(sql, params);
        if sql.contains("lastval") {
            self.next_identity += 1;
            return Ok(Some(self.next_identity));
        }
        Ok(None)
    }

    async fn fetch_f64(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<f64>> {
        self.check_failure(sql)?;
        self.record(sql, params);
        Ok(Some(19.99))
    }

    async fn fetch_text(&mut self, sql: &str, params: &[SqlParam]) -> Result<Option<String>> {
        self.check_failure(sql)?;
        self.record(sql, params);
        Ok(Some("ok".to_string()))
    }

    async fn fetch_numeric_row(&mut self, sql: &str) -> Result<Vec<(String, Option<i64>)>> {
        self.check_failure(sql)?;
        self.record(sql, &[]);
        Ok(self
            .numeric_responses
            .pop_front()
            .unwrap_or_else(|| vec![("violations".to_string(), Some(0))]))
    }
}

pub const READ_QUERIES: &str = "\
SELECT o.order_id, o.status, o.total FROM orders o WHERE o.customer_id = $1 ORDER BY o.created_at DESC;
SELECT c.city, SUM(o.total) AS revenue FROM orders o JOIN customers c ON c.customer_id = o.customer_id GROUP BY c.city;
SELECT p.name, SUM(oi.quantity) AS units FROM order_items oi JOIN products p ON p.product_id = oi.product_id GROUP BY p.name;
SELECT customer_id, full_name FROM customers ORDER BY created_at DESC LIMIT 10;
SELECT status, AVG(total) AS avg_total FROM orders GROUP BY status;";

pub const WRITE_QUERIES: &str = "\
INSERT INTO customers (full_name, email, city) VALUES ($1, $2, $3);
INSERT INTO orders (customer_id, status, total) VALUES ($1, $2, $3);
INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES ($1, $2, $3, $4);
UPDATE orders SET status = $1 WHERE order_id = $2;
INSERT INTO audit_log (level, message) VALUES ($1, $2);";

pub fn test_catalog() -> loadcell::Catalog {
    loadcell::Catalog::load(READ_QUERIES, WRITE_QUERIES).unwrap()
}
