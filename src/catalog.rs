use rand::Rng;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::schema::split_statements;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Read,
    Write,
}

/// Logical operation tag, resolved once at load time from canonical
/// substrings in the statement text. The same text always yields the
/// same tag, so reported labels are stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    OrdersByCustomer,
    RevenueByCity,
    TopProducts,
    RecentCustomers,
    AvgTotalByStatus,
    OtherRead,
    InsertCustomer,
    InsertOrder,
    InsertOrderItem,
    UpdateOrderStatus,
    AuditAppend,
    OtherWrite,
}

impl OpKind {
    pub fn label(self) -> &'static str {
        match self {
            OpKind::OrdersByCustomer => "orders_by_customer",
            OpKind::RevenueByCity => "revenue_by_city",
            OpKind::TopProducts => "top_products",
            OpKind::RecentCustomers => "recent_customers",
            OpKind::AvgTotalByStatus => "avg_total_by_status",
            OpKind::OtherRead => "other_read",
            OpKind::InsertCustomer => "insert_customer",
            OpKind::InsertOrder => "insert_order_and_items",
            OpKind::InsertOrderItem => "insert_order_item",
            OpKind::UpdateOrderStatus => "update_order_status",
            OpKind::AuditAppend => "audit_append",
            OpKind::OtherWrite => "other_write",
        }
    }

    fn classify_read(sql: &str) -> OpKind {
        if sql.contains("WHERE o.customer_id = $1") {
            OpKind::OrdersByCustomer
        } else if sql.contains("SUM(o.total)") {
            OpKind::RevenueByCity
        } else if sql.contains("SUM(oi.quantity)") {
            OpKind::TopProducts
        } else if sql.contains("created_at") {
            OpKind::RecentCustomers
        } else if sql.contains("AVG(") {
            OpKind::AvgTotalByStatus
        } else {
            OpKind::OtherRead
        }
    }

    fn classify_write(sql: &str) -> OpKind {
        let sql = sql.trim_start();
        if sql.starts_with("INSERT INTO order_items") {
            OpKind::InsertOrderItem
        } else if sql.starts_with("INSERT INTO orders") {
            OpKind::InsertOrder
        } else if sql.starts_with("INSERT INTO customers") {
            OpKind::InsertCustomer
        } else if sql.starts_with("UPDATE orders") {
            OpKind::UpdateOrderStatus
        } else if sql.contains("audit_log") {
            OpKind::AuditAppend
        } else {
            OpKind::OtherWrite
        }
    }
}

/// One parametrized statement template. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct OpTemplate {
    pub name: &'static str,
    pub sql: String,
    pub role: Role,
    pub kind: OpKind,
}

/// Ordered read and write templates, one statement per template, in
/// payload file order.
#[derive(Debug)]
pub struct Catalog {
    reads: Vec<OpTemplate>,
    writes: Vec<OpTemplate>,
}

impl Catalog {
    pub fn load(read_payload: &str, write_payload: &str) -> Result<Self> {
        let reads: Vec<OpTemplate> = split_statements(read_payload)
            .into_iter()
            .map(|sql| {
                let kind = OpKind::classify_read(&sql);
                OpTemplate {
                    name: kind.label(),
                    sql,
                    role: Role::Read,
                    kind,
                }
            })
            .collect();
        let writes: Vec<OpTemplate> = split_statements(write_payload)
            .into_iter()
            .map(|sql| {
                let kind = OpKind::classify_write(&sql);
                OpTemplate {
                    name: kind.label(),
                    sql,
                    role: Role::Write,
                    kind,
                }
            })
            .collect();
        if reads.is_empty() {
            return Err(Error::Config("read query catalog is empty".into()));
        }
        if writes.is_empty() {
            return Err(Error::Config("write query catalog is empty".into()));
        }
        Ok(Self { reads, writes })
    }

    pub fn pick_read<R: Rng>(&self, rng: &mut R) -> &OpTemplate {
        &self.reads[rng.random_range(0..self.reads.len())]
    }

    pub fn pick_write<R: Rng>(&self, rng: &mut R) -> &OpTemplate {
        &self.writes[rng.random_range(0..self.writes.len())]
    }

    /// Companion template lookup (audit appends, order-item inserts).
    pub fn find(&self, kind: OpKind) -> Option<&OpTemplate> {
        self.reads
            .iter()
            .chain(self.writes.iter())
            .find(|t| t.kind == kind)
    }

    /// The designated benchmark read: filter by customer id. Missing
    /// template is a setup error, not a soft skip.
    pub fn benchmark_read(&self) -> Result<&OpTemplate> {
        self.find(OpKind::OrdersByCustomer).ok_or_else(|| {
            Error::BenchmarkSetup("no read template filters by customer id".into())
        })
    }

    pub fn reads(&self) -> &[OpTemplate] {
        &self.reads
    }

    pub fn writes(&self) -> &[OpTemplate] {
        &self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const READS: &str = "\
SELECT o.order_id FROM orders o WHERE o.customer_id = $1 ORDER BY o.created_at DESC;
SELECT c.city, SUM(o.total) FROM orders o JOIN customers c ON c.customer_id = o.customer_id GROUP BY c.city;
SELECT p.name, SUM(oi.quantity) FROM order_items oi JOIN products p ON p.product_id = oi.product_id GROUP BY p.name;
SELECT customer_id FROM customers ORDER BY created_at DESC LIMIT 10;
SELECT status, AVG(total) FROM orders GROUP BY status;";

    const WRITES: &str = "\
INSERT INTO customers (full_name, email, city) VALUES ($1, $2, $3);
INSERT INTO orders (customer_id, status, total) VALUES ($1, $2, $3);
INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES ($1, $2, $3, $4);
UPDATE orders SET status = $1 WHERE order_id = $2;
INSERT INTO audit_log (level, message) VALUES ($1, $2);";

    #[test]
    fn classification_is_stable_and_ordered() {
        let catalog = Catalog::load(READS, WRITES).unwrap();
        let read_kinds: Vec<OpKind> = catalog.reads().iter().map(|t| t.kind).collect();
        assert_eq!(
            read_kinds,
            vec![
                OpKind::OrdersByCustomer,
                OpKind::RevenueByCity,
                OpKind::TopProducts,
                OpKind::RecentCustomers,
                OpKind::AvgTotalByStatus,
            ]
        );
        let write_kinds: Vec<OpKind> = catalog.writes().iter().map(|t| t.kind).collect();
        assert_eq!(
            write_kinds,
            vec![
                OpKind::InsertCustomer,
                OpKind::InsertOrder,
                OpKind::InsertOrderItem,
                OpKind::UpdateOrderStatus,
                OpKind::AuditAppend,
            ]
        );
    }

    #[test]
    fn same_text_same_label() {
        let a = Catalog::load(READS, WRITES).unwrap();
        let b = Catalog::load(READS, WRITES).unwrap();
        for (ta, tb) in a.reads().iter().zip(b.reads()) {
            assert_eq!(ta.name, tb.name);
        }
    }

    #[test]
    fn customer_id_predicate_wins_over_created_at() {
        // The benchmark read also mentions created_at in its ORDER BY;
        // the customer-id predicate must take precedence.
        let kind = OpKind::classify_read(
            "SELECT o.order_id FROM orders o WHERE o.customer_id = $1 ORDER BY o.created_at",
        );
        assert_eq!(kind, OpKind::OrdersByCustomer);
    }

    #[test]
    fn order_items_not_mistaken_for_orders() {
        assert_eq!(
            OpKind::classify_write("INSERT INTO order_items (order_id) VALUES ($1)"),
            OpKind::InsertOrderItem
        );
        assert_eq!(
            OpKind::classify_write("INSERT INTO orders (customer_id) VALUES ($1)"),
            OpKind::InsertOrder
        );
    }

    #[test]
    fn pick_is_uniform_choice_from_catalog() {
        let catalog = Catalog::load(READS, WRITES).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let t = catalog.pick_read(&mut rng);
            assert_eq!(t.role, Role::Read);
            let w = catalog.pick_write(&mut rng);
            assert_eq!(w.role, Role::Write);
        }
    }

    #[test]
    fn benchmark_template_lookup() {
        let catalog = Catalog::load(READS, WRITES).unwrap();
        assert_eq!(catalog.benchmark_read().unwrap().kind, OpKind::OrdersByCustomer);

        let no_bench = Catalog::load("SELECT status, AVG(total) FROM orders GROUP BY status;", WRITES).unwrap();
        assert!(matches!(
            no_bench.benchmark_read(),
            Err(Error::BenchmarkSetup(_))
        ));
    }

    #[test]
    fn empty_catalog_is_a_config_error() {
        assert!(Catalog::load("", WRITES).is_err());
        assert!(Catalog::load(READS, " ; ").is_err());
    }
}
