//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;

use crate::compiler::{CompiledQuery, CompiledQueryCache, CompilerOptions, DeclarativeQuery, QueryCompiler};
use crate::consistency::ConsistencyChecker;
use crate::core::cli::{self, CliConfig, Commands, QueryArgs};
use crate::core::config::AppConfig;
use crate::core::constants::{
    APP_NAME_LOWER, CACHE_TTL_COMPILED_QUERY, DEFAULT_QUERY_TIMEOUT_SECS, ENV_LOG,
};
use crate::data::{self, ClickhouseExecutor, DuckdbExecutor, ExecuteOptions};
use crate::error::QueryError;
use crate::scope::ProjectScope;
use crate::sql::Backend;
use crate::utils::file::read_inline_or_file;
use crate::views::{SchemaVersion, ViewRegistry};

pub struct CoreApp {
    pub config: AppConfig,
    pub compiler: QueryCompiler,
    pub cache: CompiledQueryCache,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config)?;
        app.handle(command).await
    }

    pub fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let registry = Arc::new(ViewRegistry::builtin());
        let compiler = QueryCompiler::new(registry, config.backend).with_options(CompilerOptions {
            max_filters: config.query.max_filters,
        });
        let cache = CompiledQueryCache::new(
            config.query.cache_max_entries,
            Duration::from_secs(CACHE_TTL_COMPILED_QUERY),
        );
        Ok(Self {
            config,
            compiler,
            cache,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    pub async fn handle(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Compile { query } => {
                let compiled = self.compile(&query)?;
                print_json(&serde_json::to_value(compiled.as_ref())?)
            }
            Commands::Validate { query } => {
                self.compile(&query)?;
                println!("ok");
                Ok(())
            }
            Commands::Views => print_json(&self.catalog()),
            Commands::Run { query } => {
                let compiled = self.compile(&query)?;
                let executor = data::connect(&self.config)?;
                let rows = executor
                    .execute(&compiled, &self.execute_options())
                    .await
                    .with_context(|| format!("Failed to run query on {}", self.config.backend))?;
                print_json(&serde_json::to_value(rows)?)
            }
            Commands::Check { query } => {
                let (parsed, scope) = load_query(&query)?;
                let executor = data::connect(&self.config)?;
                let checker =
                    ConsistencyChecker::new(self.compiler.clone(), executor, self.config.consistency)
                        .with_options(self.execute_options());
                let report = checker.check(&parsed, &scope).await?;
                print_json(&serde_json::to_value(&report)?)?;
                if !report.is_consistent() {
                    anyhow::bail!("v1 and v2 results diverge beyond tolerance");
                }
                Ok(())
            }
            Commands::Schema { apply } => self.schema(apply).await,
        }
    }

    fn compile(&self, args: &QueryArgs) -> Result<Arc<CompiledQuery>> {
        let (query, scope) = load_query(args)?;
        self.cache
            .get_or_compile(
                &self.compiler,
                &query,
                &scope,
                self.config.query.schema_version,
                self.config.query.split_optimization,
            )
            .map_err(structured)
    }

    fn execute_options(&self) -> ExecuteOptions {
        let secs = match self.config.backend {
            Backend::Clickhouse => self.config.clickhouse.timeout_secs,
            Backend::Duckdb => DEFAULT_QUERY_TIMEOUT_SECS,
        };
        ExecuteOptions::with_timeout(Duration::from_secs(secs))
    }

    /// Every registered view with what it can be queried by
    fn catalog(&self) -> serde_json::Value {
        let registry = self.compiler.registry();
        let views: Vec<serde_json::Value> = registry
            .list()
            .into_iter()
            .filter_map(|(name, version)| registry.resolve(name, version).ok())
            .map(|view| {
                let dimensions: Vec<serde_json::Value> = view
                    .dimensions
                    .iter()
                    .map(|(name, d)| {
                        json!({
                            "name": name,
                            "type": d.value_type.as_str(),
                            "highCardinality": d.high_cardinality,
                            "payload": d.payload,
                            "description": d.description,
                        })
                    })
                    .collect();
                let measures: Vec<serde_json::Value> = view
                    .measures
                    .iter()
                    .map(|(name, m)| {
                        json!({
                            "name": name,
                            "type": m.value_type.as_str(),
                            "aggregations": m.permitted_aggregations(),
                            "description": m.description,
                        })
                    })
                    .collect();
                json!({
                    "name": view.name,
                    "version": view.version,
                    "description": view.description,
                    "dimensions": dimensions,
                    "measures": measures,
                })
            })
            .collect();
        json!({ "views": views })
    }

    async fn schema(&self, apply: bool) -> Result<()> {
        match (self.config.backend, apply) {
            (Backend::Duckdb, false) => {
                println!("{}", data::duckdb::schema::full_schema());
            }
            (Backend::Clickhouse, false) => {
                let mut printed: Vec<String> = Vec::new();
                for version in [SchemaVersion::V1, SchemaVersion::V2] {
                    for statement in data::clickhouse::schema::generate_schema(version) {
                        if !printed.contains(&statement) {
                            println!("{};", statement.trim());
                            printed.push(statement);
                        }
                    }
                }
            }
            (Backend::Duckdb, true) => {
                let Some(ref path) = self.config.duckdb.path else {
                    anyhow::bail!("duckdb.path is required to apply the schema");
                };
                DuckdbExecutor::open(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                tracing::info!(path = %path.display(), "DuckDB schema applied");
            }
            (Backend::Clickhouse, true) => {
                let executor = ClickhouseExecutor::new(&self.config.clickhouse);
                executor.health_check().await?;
                for version in [SchemaVersion::V1, SchemaVersion::V2] {
                    executor.apply_schema(version).await?;
                }
                tracing::info!(url = %self.config.clickhouse.url, "ClickHouse schema applied");
            }
        }
        Ok(())
    }
}

fn load_query(args: &QueryArgs) -> Result<(DeclarativeQuery, ProjectScope)> {
    let text = read_inline_or_file(&args.query).context("Failed to read query")?;
    let query: DeclarativeQuery = serde_json::from_str(&text).context("Failed to parse query")?;
    Ok((query, ProjectScope::new(args.project.clone())))
}

/// Carry the structured error form through anyhow
fn structured(e: QueryError) -> anyhow::Error {
    let rendered = serde_json::to_string_pretty(&e.to_json()).unwrap_or_else(|_| e.to_string());
    anyhow::anyhow!(rendered)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> CoreApp {
        CoreApp::init(&CliConfig::default()).unwrap()
    }

    fn args(query: &str) -> QueryArgs {
        QueryArgs {
            query: query.to_string(),
            project: "p1".to_string(),
        }
    }

    #[test]
    fn test_compile_is_cached() {
        let app = app();
        let q = r#"{
            "view": "traces",
            "dimensions": [{"field": "name"}],
            "metrics": [{"measure": "count", "aggregation": "count"}],
            "fromTimestamp": "2024-01-01T00:00:00Z",
            "toTimestamp": "2024-01-02T00:00:00Z"
        }"#;
        let a = app.compile(&args(q)).unwrap();
        let b = app.compile(&args(q)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(app.cache.entry_count(), 1);
    }

    #[test]
    fn test_compile_error_is_structured() {
        let app = app();
        let q = r#"{
            "view": "spans",
            "metrics": [{"measure": "count", "aggregation": "count"}],
            "fromTimestamp": "2024-01-01T00:00:00Z",
            "toTimestamp": "2024-01-02T00:00:00Z"
        }"#;
        let err = app.compile(&args(q)).unwrap_err();
        let value: serde_json::Value = serde_json::from_str(&err.to_string()).unwrap();
        assert_eq!(value["kind"], "unknown_view");
    }

    #[test]
    fn test_catalog_lists_both_versions() {
        let catalog = app().catalog();
        let views = catalog["views"].as_array().unwrap();
        assert!(views.iter().any(|v| v["name"] == "traces" && v["version"] == "v2"));
        let traces = views
            .iter()
            .find(|v| v["name"] == "traces" && v["version"] == "v1")
            .unwrap();
        let input = traces["dimensions"]
            .as_array()
            .unwrap()
            .iter()
            .find(|d| d["name"] == "input")
            .unwrap();
        assert_eq!(input["payload"], true);
    }
}
