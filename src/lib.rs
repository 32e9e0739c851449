//! Batch ETL turning raw song metadata and listening-event logs into a
//! Parquet star schema.

pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod tables;

pub use config::Config;
pub use error::EtlError;
pub use pipeline::{Pipeline, RunSummary};
