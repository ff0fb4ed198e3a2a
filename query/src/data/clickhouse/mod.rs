//! ClickHouse executor
//!
//! Uses async HTTP connections to ClickHouse. The client internally pools
//! connections via HTTP keep-alive. Parameters are sent server-side and bound to
//! the `{name: Type}` placeholders the ClickHouse dialect renders.

pub mod schema;

use async_trait::async_trait;
use clickhouse::Client;

use super::error::DataError;
use super::traits::{ExecuteOptions, QueryExecutor, Row, ensure_backend};
use crate::compiler::CompiledQuery;
use crate::core::config::ClickhouseConfig;
use crate::sql::{Backend, ParamValue};
use crate::views::SchemaVersion;

const BACKEND: &str = "clickhouse";

pub struct ClickhouseExecutor {
    client: Client,
}

impl ClickhouseExecutor {
    pub fn new(config: &ClickhouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.user {
            client = client.with_user(user);
        }
        if let Some(ref password) = config.password {
            client = client.with_password(password);
        }

        // Process each partition independently during FINAL reads
        client = client.with_option("do_not_merge_across_partitions_select_final", "1");
        // Keep counts numeric in JSONEachRow output
        client = client.with_option("output_format_json_quote_64bit_integers", "0");

        tracing::debug!(
            url = %config.url,
            database = %config.database,
            "ClickHouse executor initialized"
        );

        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Health check - verify connection to ClickHouse
    pub async fn health_check(&self) -> Result<(), DataError> {
        self.client.query("SELECT 1").execute().await?;
        Ok(())
    }

    /// Create the tables of one layout
    pub async fn apply_schema(&self, version: SchemaVersion) -> Result<(), DataError> {
        for statement in schema::generate_schema(version) {
            self.client.query(&statement).execute().await?;
        }
        tracing::debug!(version = %version, "ClickHouse schema applied");
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for ClickhouseExecutor {
    fn backend(&self) -> Backend {
        Backend::Clickhouse
    }

    async fn execute(
        &self,
        query: &CompiledQuery,
        options: &ExecuteOptions,
    ) -> Result<Vec<Row>, DataError> {
        ensure_backend(Backend::Clickhouse, query)?;

        let timeout_secs = options.timeout.as_secs().max(1);
        let mut request = self
            .client
            .query(&query.sql)
            .with_option("max_execution_time", timeout_secs.to_string());
        for (name, value) in &query.params {
            request = match value {
                ParamValue::String(s) => request.param(name, s),
                ParamValue::Int(i) => request.param(name, i),
                ParamValue::Float(f) => request.param(name, f),
                ParamValue::Bool(b) => request.param(name, b),
                ParamValue::DateTime(_) => request.param(name, value.to_text()),
            };
        }

        let fetch = async {
            let mut cursor = request.fetch_bytes("JSONEachRow")?;
            cursor.collect().await
        };
        let body = tokio::time::timeout(options.timeout, fetch)
            .await
            .map_err(|_| {
                tracing::warn!(
                    view = %query.view,
                    "ClickHouse query timed out after {}s",
                    options.timeout.as_secs()
                );
                DataError::timeout(BACKEND, options.timeout.as_secs())
            })??;

        let rows = parse_rows(&body)?;
        tracing::debug!(
            view = %query.view,
            sql_len = query.sql.len(),
            params = query.params.len(),
            rows = rows.len(),
            "ClickHouse query completed"
        );
        Ok(rows)
    }
}

/// Parse a JSONEachRow body into rows
fn parse_rows(body: &[u8]) -> Result<Vec<Row>, DataError> {
    body.split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| serde_json::from_slice::<Row>(line).map_err(|e| DataError::decode(BACKEND, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_each_row() {
        let body = b"{\"name\":\"chat\",\"count_count\":2}\n{\"name\":\"search\",\"count_count\":1}\n";
        let rows = parse_rows(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["name"], "search");
        // Column order is preserved
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["name", "count_count"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_rows(b"not json\n").unwrap_err();
        assert!(matches!(err, DataError::Decode { .. }));
        assert!(parse_rows(b"").unwrap().is_empty());
    }
}
