use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not connect after {attempts} attempts, last error: {last}")]
    Connection { attempts: usize, last: String },

    #[error("schema statement failed: {statement} -> {message}")]
    Schema { statement: String, message: String },

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("benchmark setup error: {0}")]
    BenchmarkSetup(String),

    #[error("validation check {check} failed to execute: {message}")]
    Validation { check: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("report error: {0}")]
    Report(String),
}
