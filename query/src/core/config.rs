use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::consistency::ConsistencyPolicy;
use crate::filters::MAX_FILTERS;
use crate::sql::Backend;
use crate::utils::file::expand_path;
use crate::views::SchemaVersion;

use super::cli::CliConfig;
use super::constants::{
    CLICKHOUSE_DEFAULT_DATABASE, CLICKHOUSE_DEFAULT_URL, CONFIG_FILE_NAME,
    DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_QUERY_TIMEOUT_SECS,
};

// =============================================================================
// File Config (JSON)
// =============================================================================

/// ClickHouse configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ClickhouseFileConfig {
    /// ClickHouse HTTP URL (or use VANTAGE_CLICKHOUSE_URL env var)
    pub url: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Query timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// DuckDB configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DuckdbFileConfig {
    /// Database file; in-memory when unset
    pub path: Option<String>,
}

/// Query compilation section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueryFileConfig {
    pub schema_version: Option<SchemaVersion>,
    /// Request two-phase execution for payload columns
    pub split_optimization: Option<bool>,
    pub cache_max_entries: Option<u64>,
    pub max_filters: Option<usize>,
}

/// Consistency tolerances (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConsistencyFileConfig {
    pub exact_totals: Option<bool>,
    pub lag_tolerance: Option<f64>,
    pub percentile_tolerance: Option<f64>,
    pub histogram_tolerance: Option<f64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub backend: Option<Backend>,
    pub clickhouse: Option<ClickhouseFileConfig>,
    pub duckdb: Option<DuckdbFileConfig>,
    pub query: Option<QueryFileConfig>,
    pub consistency: Option<ConsistencyFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Runtime Config
// =============================================================================

/// ClickHouse configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct ClickhouseConfig {
    pub url: String,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ClickhouseConfig {
    fn default() -> Self {
        Self {
            url: CLICKHOUSE_DEFAULT_URL.to_string(),
            database: CLICKHOUSE_DEFAULT_DATABASE.to_string(),
            user: None,
            password: None,
            timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

/// DuckDB configuration (final/runtime)
#[derive(Debug, Clone, Default)]
pub struct DuckdbConfig {
    pub path: Option<PathBuf>,
}

/// Query compilation configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub schema_version: SchemaVersion,
    pub split_optimization: bool,
    pub cache_max_entries: u64,
    pub max_filters: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            schema_version: SchemaVersion::V1,
            split_optimization: false,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            max_filters: MAX_FILTERS,
        }
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: Backend,
    pub clickhouse: ClickhouseConfig,
    pub duckdb: DuckdbConfig,
    pub query: QueryConfig,
    pub consistency: ConsistencyPolicy,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Local directory config OR CLI-specified config path
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        let file_config = match path {
            Some(ref path) => {
                let config = FileConfig::load_from_file(path)?;
                config.warn_unknown_fields();
                config
            }
            None => FileConfig::default(),
        };
        tracing::debug!(config = ?path, "Config file resolved");

        let file_clickhouse = file_config.clickhouse.unwrap_or_default();
        let file_duckdb = file_config.duckdb.unwrap_or_default();
        let file_query = file_config.query.unwrap_or_default();
        let file_consistency = file_config.consistency.unwrap_or_default();

        let defaults = ClickhouseConfig::default();
        let clickhouse = ClickhouseConfig {
            url: cli
                .clickhouse_url
                .clone()
                .or(file_clickhouse.url)
                .unwrap_or(defaults.url),
            database: cli
                .clickhouse_database
                .clone()
                .or(file_clickhouse.database)
                .unwrap_or(defaults.database),
            user: cli.clickhouse_user.clone().or(file_clickhouse.user),
            password: cli.clickhouse_password.clone().or(file_clickhouse.password),
            timeout_secs: file_clickhouse.timeout_secs.unwrap_or(defaults.timeout_secs),
        };

        let duckdb = DuckdbConfig {
            path: cli
                .duckdb_path
                .clone()
                .or(file_duckdb.path.map(PathBuf::from))
                .map(|p| expand_path(&p.to_string_lossy())),
        };

        let defaults = QueryConfig::default();
        let query = QueryConfig {
            schema_version: cli
                .schema_version
                .or(file_query.schema_version)
                .unwrap_or(defaults.schema_version),
            split_optimization: cli
                .split_optimization
                .or(file_query.split_optimization)
                .unwrap_or(defaults.split_optimization),
            cache_max_entries: file_query
                .cache_max_entries
                .unwrap_or(defaults.cache_max_entries),
            max_filters: file_query.max_filters.unwrap_or(defaults.max_filters),
        };

        let defaults = ConsistencyPolicy::default();
        let consistency = ConsistencyPolicy {
            exact_totals: file_consistency.exact_totals.unwrap_or(defaults.exact_totals),
            lag_tolerance: file_consistency.lag_tolerance.unwrap_or(defaults.lag_tolerance),
            percentile_tolerance: file_consistency
                .percentile_tolerance
                .unwrap_or(defaults.percentile_tolerance),
            histogram_tolerance: file_consistency
                .histogram_tolerance
                .unwrap_or(defaults.histogram_tolerance),
        };

        let config = Self {
            backend: cli.backend.or(file_config.backend).unwrap_or(Backend::Duckdb),
            clickhouse,
            duckdb,
            query,
            consistency,
        };

        config.validate()?;

        tracing::debug!(
            backend = %config.backend,
            schema_version = %config.query.schema_version,
            split_optimization = config.query.split_optimization,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.backend == Backend::Clickhouse && self.clickhouse.url.trim().is_empty() {
            anyhow::bail!("Configuration error: clickhouse.url must not be empty");
        }
        if self.clickhouse.timeout_secs == 0 {
            anyhow::bail!("Configuration error: clickhouse.timeout_secs must be greater than 0");
        }
        if self.query.max_filters == 0 {
            anyhow::bail!("Configuration error: query.max_filters must be greater than 0");
        }
        if self.query.cache_max_entries == 0 {
            tracing::warn!("query.cache_max_entries is 0, compiled queries will not be cached");
        }

        let tolerances = [
            ("lag_tolerance", self.consistency.lag_tolerance),
            ("percentile_tolerance", self.consistency.percentile_tolerance),
            ("histogram_tolerance", self.consistency.histogram_tolerance),
        ];
        for (name, value) in tolerances {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!(
                    "Configuration error: consistency.{} must be between 0 and 1, got {}",
                    name,
                    value
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    fn cli_with(file: &tempfile::NamedTempFile) -> CliConfig {
        CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "backend": "clickhouse",
            "clickhouse": { "url": "http://ch:8123", "database": "obs", "timeout_secs": 10 },
            "query": { "schema_version": "v2", "split_optimization": true },
            "consistency": { "lag_tolerance": 0.1 }
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.backend, Some(Backend::Clickhouse));
        let clickhouse = config.clickhouse.as_ref().unwrap();
        assert_eq!(clickhouse.url.as_deref(), Some("http://ch:8123"));
        assert_eq!(clickhouse.timeout_secs, Some(10));
        let query = config.query.as_ref().unwrap();
        assert_eq!(query.schema_version, Some(SchemaVersion::V2));
        assert_eq!(query.split_optimization, Some(true));
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "backend": "duckdb", "unknown_field": 123 }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.backend, Some(Backend::Duckdb));
        assert_eq!(config.extra.get("unknown_field").unwrap(), 123);
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::load(&CliConfig::default()).unwrap();

        assert_eq!(config.backend, Backend::Duckdb);
        assert_eq!(config.query.schema_version, SchemaVersion::V1);
        assert!(!config.query.split_optimization);
        assert_eq!(config.query.max_filters, MAX_FILTERS);
        assert_eq!(config.consistency, ConsistencyPolicy::default());
        assert!(config.duckdb.path.is_none());
    }

    #[test]
    fn test_app_config_from_file() {
        let file = write_config(
            r#"{
                "clickhouse": { "database": "obs" },
                "query": { "schema_version": "v2", "max_filters": 10 },
                "consistency": { "exact_totals": false, "percentile_tolerance": 0.2 }
            }"#,
        );
        let config = AppConfig::load(&cli_with(&file)).unwrap();

        assert_eq!(config.clickhouse.database, "obs");
        assert_eq!(config.clickhouse.url, CLICKHOUSE_DEFAULT_URL);
        assert_eq!(config.query.schema_version, SchemaVersion::V2);
        assert_eq!(config.query.max_filters, 10);
        assert!(!config.consistency.exact_totals);
        assert_eq!(config.consistency.percentile_tolerance, 0.2);
        assert_eq!(config.consistency.lag_tolerance, 0.05);
    }

    #[test]
    fn test_app_config_cli_override() {
        let file = write_config(r#"{ "backend": "duckdb", "query": { "schema_version": "v1" } }"#);
        let cli = CliConfig {
            backend: Some(Backend::Clickhouse),
            schema_version: Some(SchemaVersion::V2),
            clickhouse_url: Some("http://cli:8123".to_string()),
            split_optimization: Some(true),
            ..cli_with(&file)
        };
        let config = AppConfig::load(&cli).unwrap();

        assert_eq!(config.backend, Backend::Clickhouse);
        assert_eq!(config.query.schema_version, SchemaVersion::V2);
        assert_eq!(config.clickhouse.url, "http://cli:8123");
        assert!(config.query.split_optimization);
    }

    #[test]
    fn test_app_config_missing_file() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/vantage.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_app_config_validation_tolerance_range() {
        let file = write_config(r#"{ "consistency": { "histogram_tolerance": 1.5 } }"#);
        let err = AppConfig::load(&cli_with(&file)).unwrap_err();
        assert!(err.to_string().contains("consistency.histogram_tolerance"));
    }

    #[test]
    fn test_app_config_validation_zero_timeout() {
        let file = write_config(r#"{ "clickhouse": { "timeout_secs": 0 } }"#);
        let err = AppConfig::load(&cli_with(&file)).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }
}
