//! Data access layer
//!
//! Runs compiled queries against the analytical stores:
//! - `duckdb` - Embedded local backend, also used by the execution tests
//! - `clickhouse` - Production backend over HTTP
//! - `traits` - The `QueryExecutor` seam both backends implement
//! - `error` - Unified error type for all backends

pub mod clickhouse;
pub mod duckdb;
pub mod error;
pub mod traits;

pub use clickhouse::ClickhouseExecutor;
pub use duckdb::DuckdbExecutor;
pub use error::DataError;
pub use traits::{ExecuteOptions, QueryExecutor, Row};

use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::sql::Backend;

/// Build the executor selected by configuration
///
/// For DuckDB, opens `duckdb.path` or an in-memory database when unset.
pub fn connect(config: &AppConfig) -> Result<Arc<dyn QueryExecutor>, DataError> {
    match config.backend {
        Backend::Duckdb => {
            let executor = match config.duckdb.path {
                Some(ref path) => DuckdbExecutor::open(path)?,
                None => DuckdbExecutor::in_memory()?,
            };
            Ok(Arc::new(executor))
        }
        Backend::Clickhouse => Ok(Arc::new(ClickhouseExecutor::new(&config.clickhouse))),
    }
}
