//! SQL abstraction layer
//!
//! Queries are assembled as expression trees ([`expr`], [`query`]) and turned
//! into text by a single [`Renderer`] pass for a target dialect.

mod clickhouse_dialect;
mod dialect;
mod duckdb_dialect;
pub mod expr;
pub mod params;
pub mod query;
mod render;

use serde::{Deserialize, Serialize};

pub use clickhouse_dialect::ClickhouseDialect;
pub use dialect::SqlDialect;
pub use duckdb_dialect::DuckdbDialect;
pub use params::{Param, ParamValue};
pub use render::{RenderedSql, Renderer};

/// Analytical store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Duckdb,
    Clickhouse,
}

impl Backend {
    /// Get the SQL dialect for this backend
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Backend::Duckdb => &DuckdbDialect,
            Backend::Clickhouse => &ClickhouseDialect,
        }
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Duckdb => "duckdb",
            Backend::Clickhouse => "clickhouse",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duckdb" => Ok(Backend::Duckdb),
            "clickhouse" => Ok(Backend::Clickhouse),
            other => Err(format!(
                "Invalid backend '{}'. Use: duckdb or clickhouse",
                other
            )),
        }
    }
}
