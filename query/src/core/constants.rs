// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Vantage";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "vantage";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "vantage.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "VANTAGE_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "VANTAGE_LOG";

// =============================================================================
// Environment Variables - Backends
// =============================================================================

/// Environment variable for the analytics backend (duckdb or clickhouse)
pub const ENV_BACKEND: &str = "VANTAGE_BACKEND";

/// Environment variable for the schema version queries target (v1 or v2)
pub const ENV_SCHEMA_VERSION: &str = "VANTAGE_SCHEMA_VERSION";

/// Environment variable for the DuckDB database file
pub const ENV_DUCKDB_PATH: &str = "VANTAGE_DUCKDB_PATH";

/// Environment variable for ClickHouse URL
pub const ENV_CLICKHOUSE_URL: &str = "VANTAGE_CLICKHOUSE_URL";

/// Environment variable for ClickHouse database
pub const ENV_CLICKHOUSE_DATABASE: &str = "VANTAGE_CLICKHOUSE_DATABASE";

/// Environment variable for ClickHouse user
pub const ENV_CLICKHOUSE_USER: &str = "VANTAGE_CLICKHOUSE_USER";

/// Environment variable for ClickHouse password
pub const ENV_CLICKHOUSE_PASSWORD: &str = "VANTAGE_CLICKHOUSE_PASSWORD";

/// Environment variable for the split optimization toggle
pub const ENV_SPLIT_OPTIMIZATION: &str = "VANTAGE_SPLIT_OPTIMIZATION";

// =============================================================================
// ClickHouse
// =============================================================================

/// Default ClickHouse HTTP endpoint
pub const CLICKHOUSE_DEFAULT_URL: &str = "http://localhost:8123";

/// Default ClickHouse database
pub const CLICKHOUSE_DEFAULT_DATABASE: &str = "default";

// =============================================================================
// Query Execution
// =============================================================================

/// Default per-query timeout for both backends
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default compiled query cache capacity
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;

/// Time-to-live for cached compiled queries
pub const CACHE_TTL_COMPILED_QUERY: u64 = 600;
