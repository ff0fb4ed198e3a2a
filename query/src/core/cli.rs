use clap::{Args, Parser, Subcommand};

use std::path::PathBuf;

use crate::sql::Backend;
use crate::views::SchemaVersion;

use super::constants::{
    ENV_BACKEND, ENV_CLICKHOUSE_DATABASE, ENV_CLICKHOUSE_PASSWORD, ENV_CLICKHOUSE_URL,
    ENV_CLICKHOUSE_USER, ENV_CONFIG, ENV_DUCKDB_PATH, ENV_SCHEMA_VERSION, ENV_SPLIT_OPTIMIZATION,
};

#[derive(Parser)]
#[command(name = "vantage")]
#[command(version, about = "Declarative analytics queries over LLM traces", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Analytics backend (duckdb or clickhouse)
    #[arg(long, short = 'b', global = true, env = ENV_BACKEND, value_parser = parse_backend)]
    pub backend: Option<Backend>,

    /// Physical schema version (v1 or v2)
    #[arg(long = "schema-version", global = true, env = ENV_SCHEMA_VERSION, value_parser = parse_schema_version)]
    pub schema_version: Option<SchemaVersion>,

    /// DuckDB database file (in-memory when unset)
    #[arg(long, global = true, env = ENV_DUCKDB_PATH)]
    pub duckdb_path: Option<PathBuf>,

    /// ClickHouse HTTP URL
    #[arg(long, global = true, env = ENV_CLICKHOUSE_URL)]
    pub clickhouse_url: Option<String>,

    /// ClickHouse database
    #[arg(long, global = true, env = ENV_CLICKHOUSE_DATABASE)]
    pub clickhouse_database: Option<String>,

    /// ClickHouse user
    #[arg(long, global = true, env = ENV_CLICKHOUSE_USER)]
    pub clickhouse_user: Option<String>,

    /// ClickHouse password
    #[arg(long, global = true, env = ENV_CLICKHOUSE_PASSWORD, hide_env_values = true)]
    pub clickhouse_password: Option<String>,

    /// Request two-phase execution for payload columns
    #[arg(long, global = true, env = ENV_SPLIT_OPTIMIZATION)]
    pub split_optimization: Option<bool>,
}

/// Parse backend from CLI/env string
fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse::<Backend>()
        .map_err(|_| format!("Invalid backend '{}'. Valid options: duckdb, clickhouse", s))
}

/// Parse schema version from CLI/env string
fn parse_schema_version(s: &str) -> Result<SchemaVersion, String> {
    s.parse::<SchemaVersion>()
        .map_err(|_| format!("Invalid schema version '{}'. Valid options: v1, v2", s))
}

/// A declarative query and the project it runs for
#[derive(Args, Clone, Debug)]
pub struct QueryArgs {
    /// Query as inline JSON, a path to a JSON file, or `-` for stdin
    pub query: String,

    /// Project the query is scoped to
    #[arg(long, short = 'p')]
    pub project: String,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Compile a query and print SQL with parameters as JSON
    Compile {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Check a query without printing SQL
    Validate {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// List views with their dimensions, measures and aggregations
    Views,
    /// Compile and execute a query, printing result rows as JSON
    Run {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Run a query against both schema versions and compare the answers
    Check {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Print or apply table DDL
    Schema {
        /// Create the tables on the configured backend instead of printing
        #[arg(long)]
        apply: bool,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub schema_version: Option<SchemaVersion>,
    pub duckdb_path: Option<PathBuf>,
    pub clickhouse_url: Option<String>,
    pub clickhouse_database: Option<String>,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub split_optimization: Option<bool>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        backend: cli.backend,
        schema_version: cli.schema_version,
        duckdb_path: cli.duckdb_path,
        clickhouse_url: cli.clickhouse_url,
        clickhouse_database: cli.clickhouse_database,
        clickhouse_user: cli.clickhouse_user,
        clickhouse_password: cli.clickhouse_password,
        split_optimization: cli.split_optimization,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile_with_globals() {
        let cli = Cli::try_parse_from([
            "vantage",
            "compile",
            r#"{"view":"traces"}"#,
            "--project",
            "p1",
            "--backend",
            "clickhouse",
            "--schema-version",
            "v2",
        ])
        .unwrap();
        assert_eq!(cli.backend, Some(Backend::Clickhouse));
        assert_eq!(cli.schema_version, Some(SchemaVersion::V2));
        match cli.command {
            Commands::Compile { query } => assert_eq!(query.project, "p1"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let result = Cli::try_parse_from(["vantage", "--backend", "postgres", "views"]);
        assert!(result.is_err());
    }
}
