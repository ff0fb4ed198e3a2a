//! ClickHouse schema definitions
//!
//! - v1 tables use ReplacingMergeTree and are read with `FINAL`
//! - `events` is an append-only MergeTree
//! - Partitioned by month, ordered for project + time range scans

use crate::views::SchemaVersion;

fn traces_table() -> String {
    r#"
CREATE TABLE IF NOT EXISTS traces (
    project_id String,
    id String,
    timestamp DateTime64(3),
    name String DEFAULT '',
    user_id Nullable(String),
    session_id Nullable(String),
    release Nullable(String),
    environment LowCardinality(String) DEFAULT 'default',
    tags Array(String) DEFAULT [],
    metadata Map(LowCardinality(String), String),
    input Nullable(String) CODEC(ZSTD(3)),
    output Nullable(String) CODEC(ZSTD(3)),
    event_ts DateTime64(3) DEFAULT now64(3),
    INDEX idx_id id TYPE bloom_filter(0.001) GRANULARITY 1
) ENGINE = ReplacingMergeTree(event_ts)
PARTITION BY toYYYYMM(timestamp)
ORDER BY (project_id, toDate(timestamp), id)
"#
    .to_string()
}

fn observations_table() -> String {
    r#"
CREATE TABLE IF NOT EXISTS observations (
    project_id String,
    id String,
    trace_id String,
    parent_observation_id Nullable(String),
    type LowCardinality(String),
    name String DEFAULT '',
    level LowCardinality(String) DEFAULT 'DEFAULT',
    environment LowCardinality(String) DEFAULT 'default',
    version Nullable(String),
    provided_model_name Nullable(String),
    prompt_name Nullable(String),
    start_time DateTime64(3),
    end_time Nullable(DateTime64(3)),
    completion_start_time Nullable(DateTime64(3)),
    metadata Map(LowCardinality(String), String),
    usage_details Map(LowCardinality(String), Int64),
    total_cost Nullable(Decimal64(12)),
    input Nullable(String) CODEC(ZSTD(3)),
    output Nullable(String) CODEC(ZSTD(3)),
    event_ts DateTime64(3) DEFAULT now64(3),
    INDEX idx_id id TYPE bloom_filter(0.001) GRANULARITY 1,
    INDEX idx_trace_id trace_id TYPE bloom_filter(0.001) GRANULARITY 1
) ENGINE = ReplacingMergeTree(event_ts)
PARTITION BY toYYYYMM(start_time)
ORDER BY (project_id, type, toDate(start_time), id)
"#
    .to_string()
}

fn scores_table() -> String {
    r#"
CREATE TABLE IF NOT EXISTS scores (
    project_id String,
    id String,
    timestamp DateTime64(3),
    trace_id String,
    observation_id Nullable(String),
    name String,
    source LowCardinality(String) DEFAULT 'API',
    data_type LowCardinality(String),
    value Nullable(Float64),
    string_value Nullable(String),
    environment LowCardinality(String) DEFAULT 'default',
    event_ts DateTime64(3) DEFAULT now64(3),
    INDEX idx_trace_id trace_id TYPE bloom_filter(0.001) GRANULARITY 1
) ENGINE = ReplacingMergeTree(event_ts)
PARTITION BY toYYYYMM(timestamp)
ORDER BY (project_id, toDate(timestamp), name, id)
"#
    .to_string()
}

fn events_table() -> String {
    r#"
CREATE TABLE IF NOT EXISTS events (
    project_id String,
    trace_id String,
    span_id String,
    parent_span_id Nullable(String),
    type LowCardinality(String),
    name String DEFAULT '',
    level LowCardinality(String) DEFAULT 'DEFAULT',
    environment LowCardinality(String) DEFAULT 'default',
    version Nullable(String),
    provided_model_name Nullable(String),
    prompt_name Nullable(String),
    start_time DateTime64(3),
    end_time Nullable(DateTime64(3)),
    completion_start_time Nullable(DateTime64(3)),
    metadata Map(LowCardinality(String), String),
    usage_details Map(LowCardinality(String), Int64),
    total_cost Nullable(Decimal64(12)),
    input Nullable(String) CODEC(ZSTD(3)),
    output Nullable(String) CODEC(ZSTD(3)),
    trace_name String DEFAULT '',
    user_id Nullable(String),
    session_id Nullable(String),
    release Nullable(String),
    tags Array(String) DEFAULT [],
    INDEX idx_trace_id trace_id TYPE bloom_filter(0.001) GRANULARITY 1,
    INDEX idx_span_id span_id TYPE bloom_filter(0.001) GRANULARITY 1
) ENGINE = MergeTree()
PARTITION BY toYYYYMM(start_time)
ORDER BY (project_id, toDate(start_time), trace_id, span_id)
"#
    .to_string()
}

/// Statements creating one layout, scores included
pub fn generate_schema(version: SchemaVersion) -> Vec<String> {
    match version {
        SchemaVersion::V1 => vec![traces_table(), observations_table(), scores_table()],
        SchemaVersion::V2 => vec![events_table(), scores_table()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_tables_are_replacing() {
        let statements = generate_schema(SchemaVersion::V1);
        assert_eq!(statements.len(), 3);
        assert!(statements.iter().all(|s| s.contains("ReplacingMergeTree")));
    }

    #[test]
    fn test_events_append_only() {
        let statements = generate_schema(SchemaVersion::V2);
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS events"));
        assert!(statements[0].contains("ENGINE = MergeTree()"));
    }
}
