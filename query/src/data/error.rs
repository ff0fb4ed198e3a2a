//! Unified error type for query execution
//!
//! Wraps backend-specific errors while preserving which backend produced them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    /// DuckDB database error (local analytics backend)
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// ClickHouse database error (analytics backend)
    #[error("ClickHouse error: {0}")]
    Clickhouse(#[from] clickhouse::error::Error),

    /// Query timeout
    #[error("Query timeout after {timeout_secs}s on {backend}")]
    Timeout {
        backend: &'static str,
        timeout_secs: u64,
    },

    /// Blocking task panicked or was cancelled
    #[error("Query task failed on {backend}: {message}")]
    Join {
        backend: &'static str,
        message: String,
    },

    /// Result rows could not be decoded
    #[error("Failed to decode {backend} result: {message}")]
    Decode {
        backend: &'static str,
        message: String,
    },

    /// Compiled for a different backend than the executor
    #[error("Query compiled for {compiled} cannot run on {backend}")]
    BackendMismatch {
        backend: &'static str,
        compiled: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Create a timeout error
    pub fn timeout(backend: &'static str, timeout_secs: u64) -> Self {
        Self::Timeout {
            backend,
            timeout_secs,
        }
    }

    pub fn join(backend: &'static str, e: impl std::fmt::Display) -> Self {
        Self::Join {
            backend,
            message: e.to_string(),
        }
    }

    pub fn decode(backend: &'static str, e: impl std::fmt::Display) -> Self {
        Self::Decode {
            backend,
            message: e.to_string(),
        }
    }

    /// Check if this is a connection-related error that might be transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Clickhouse(e) => {
                let message = e.to_string();
                message.contains("connection")
                    || message.contains("timeout")
                    || message.contains("network")
            }
            _ => false,
        }
    }

    /// Get the backend name that generated this error
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Duckdb(_) => "duckdb",
            Self::Clickhouse(_) => "clickhouse",
            Self::Timeout { backend, .. }
            | Self::Join { backend, .. }
            | Self::Decode { backend, .. }
            | Self::BackendMismatch { backend, .. } => backend,
            Self::Io(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        let err = DataError::timeout("duckdb", 30);
        assert!(err.is_transient());
        assert_eq!(err.backend(), "duckdb");
        assert_eq!(err.to_string(), "Query timeout after 30s on duckdb");
    }

    #[test]
    fn test_decode_is_not_transient() {
        let err = DataError::decode("clickhouse", "expected object");
        assert!(!err.is_transient());
        assert_eq!(err.backend(), "clickhouse");
    }
}
