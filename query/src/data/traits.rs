//! Executor trait shared by the analytics backends

use std::time::Duration;

use async_trait::async_trait;

use super::error::DataError;
use crate::compiler::CompiledQuery;
use crate::core::constants::DEFAULT_QUERY_TIMEOUT_SECS;
use crate::sql::Backend;

/// One result row keyed by output column
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub timeout: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

impl ExecuteOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Runs compiled queries against an analytical store
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn backend(&self) -> Backend;

    async fn execute(
        &self,
        query: &CompiledQuery,
        options: &ExecuteOptions,
    ) -> Result<Vec<Row>, DataError>;
}

/// Reject queries rendered for another dialect
pub(crate) fn ensure_backend(executor: Backend, query: &CompiledQuery) -> Result<(), DataError> {
    if query.backend == executor {
        return Ok(());
    }
    Err(DataError::BackendMismatch {
        backend: executor.name(),
        compiled: query.backend.name(),
    })
}
