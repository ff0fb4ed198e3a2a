//! DuckDB schema definitions
//!
//! Both physical layouts side by side, used by local mode and the execution
//! tests. DuckDB has no replacing engine, so the v1 tables are plain tables and
//! rows are expected to be unique per key.

use crate::views::SchemaVersion;

/// v1: normalized traces, observations and scores
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS traces (
    project_id      VARCHAR NOT NULL,
    id              VARCHAR NOT NULL,
    timestamp       TIMESTAMP NOT NULL,
    name            VARCHAR,
    user_id         VARCHAR,
    session_id      VARCHAR,
    release         VARCHAR,
    environment     VARCHAR DEFAULT 'default',
    tags            VARCHAR[] DEFAULT [],
    metadata        MAP(VARCHAR, VARCHAR),
    input           VARCHAR,
    output          VARCHAR
);

CREATE TABLE IF NOT EXISTS observations (
    project_id              VARCHAR NOT NULL,
    id                      VARCHAR NOT NULL,
    trace_id                VARCHAR NOT NULL,
    parent_observation_id   VARCHAR,
    type                    VARCHAR NOT NULL,
    name                    VARCHAR,
    level                   VARCHAR DEFAULT 'DEFAULT',
    environment             VARCHAR DEFAULT 'default',
    version                 VARCHAR,
    provided_model_name     VARCHAR,
    prompt_name             VARCHAR,
    start_time              TIMESTAMP NOT NULL,
    end_time                TIMESTAMP,
    completion_start_time   TIMESTAMP,
    metadata                MAP(VARCHAR, VARCHAR),
    usage_details           MAP(VARCHAR, BIGINT),
    total_cost              DOUBLE,
    input                   VARCHAR,
    output                  VARCHAR
);
"#;

/// Scores are stored the same way in both layouts
pub const SCHEMA_SCORES: &str = r#"
CREATE TABLE IF NOT EXISTS scores (
    project_id      VARCHAR NOT NULL,
    id              VARCHAR NOT NULL,
    timestamp       TIMESTAMP NOT NULL,
    trace_id        VARCHAR NOT NULL,
    observation_id  VARCHAR,
    name            VARCHAR NOT NULL,
    source          VARCHAR DEFAULT 'API',
    data_type       VARCHAR NOT NULL,
    value           DOUBLE,
    string_value    VARCHAR,
    environment     VARCHAR DEFAULT 'default'
);
"#;

/// v2: one append-only row per span, trace attributes copied onto each
pub const SCHEMA_V2: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    project_id              VARCHAR NOT NULL,
    trace_id                VARCHAR NOT NULL,
    span_id                 VARCHAR NOT NULL,
    parent_span_id          VARCHAR,
    type                    VARCHAR NOT NULL,
    name                    VARCHAR,
    level                   VARCHAR DEFAULT 'DEFAULT',
    environment             VARCHAR DEFAULT 'default',
    version                 VARCHAR,
    provided_model_name     VARCHAR,
    prompt_name             VARCHAR,
    start_time              TIMESTAMP NOT NULL,
    end_time                TIMESTAMP,
    completion_start_time   TIMESTAMP,
    metadata                MAP(VARCHAR, VARCHAR),
    usage_details           MAP(VARCHAR, BIGINT),
    total_cost              DOUBLE,
    input                   VARCHAR,
    output                  VARCHAR,
    -- Denormalized trace attributes
    trace_name              VARCHAR,
    user_id                 VARCHAR,
    session_id              VARCHAR,
    release                 VARCHAR,
    tags                    VARCHAR[] DEFAULT []
);
"#;

/// DDL for one layout, scores included
pub fn schema_for(version: SchemaVersion) -> String {
    match version {
        SchemaVersion::V1 => format!("{}{}", SCHEMA_V1, SCHEMA_SCORES),
        SchemaVersion::V2 => format!("{}{}", SCHEMA_V2, SCHEMA_SCORES),
    }
}

/// DDL for both layouts in one database
pub fn full_schema() -> String {
    format!("{}{}{}", SCHEMA_V1, SCHEMA_V2, SCHEMA_SCORES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_applies() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        conn.execute_batch(&full_schema()).unwrap();
        // Idempotent
        conn.execute_batch(&schema_for(SchemaVersion::V2)).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM information_schema.tables WHERE table_name IN ('traces', 'observations', 'scores', 'events')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }
}
