pub mod bench;
pub mod catalog;
pub mod config;
pub mod error;
pub mod report;
pub mod runner;
pub mod schema;
pub mod session;
pub mod util;
pub mod validate;
pub mod workload;

pub use bench::LatencySummary;
pub use catalog::{Catalog, OpKind, OpTemplate, Role};
pub use config::{ConnSettings, RunContext, RunSettings, Scenario};
pub use error::{Error, Result};
pub use session::{PgSession, SqlParam, SqlSession};
pub use validate::ValidationReport;
pub use workload::{RoundRecord, WorkloadDriver};
