use std::sync::Arc;

use thiserror::Error;

use super::compare::{ConsistencyReport, compare_results};
use super::policy::ConsistencyPolicy;
use crate::compiler::{DeclarativeQuery, QueryCompiler};
use crate::data::{DataError, ExecuteOptions, QueryExecutor};
use crate::error::QueryError;
use crate::scope::ProjectScope;
use crate::views::SchemaVersion;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Runs one query against both layouts and compares the answers
pub struct ConsistencyChecker {
    compiler: QueryCompiler,
    executor: Arc<dyn QueryExecutor>,
    policy: ConsistencyPolicy,
    options: ExecuteOptions,
}

impl ConsistencyChecker {
    pub fn new(
        compiler: QueryCompiler,
        executor: Arc<dyn QueryExecutor>,
        policy: ConsistencyPolicy,
    ) -> Self {
        Self {
            compiler,
            executor,
            policy,
            options: ExecuteOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn check(
        &self,
        query: &DeclarativeQuery,
        scope: &ProjectScope,
    ) -> Result<ConsistencyReport, CheckError> {
        let v1 = self.compiler.build(query, scope, SchemaVersion::V1, false)?;
        let v2 = self.compiler.build(query, scope, SchemaVersion::V2, false)?;

        let v1_rows = self.executor.execute(&v1, &self.options).await?;
        let v2_rows = self.executor.execute(&v2, &self.options).await?;

        let report = compare_results(
            query,
            self.compiler.registry(),
            &v1_rows,
            &v2_rows,
            &self.policy,
        )?;

        if report.is_consistent() {
            tracing::debug!(view = %query.view, rows = report.v1_rows, "v1 and v2 agree");
        } else {
            tracing::warn!(
                view = %query.view,
                missing_in_v1 = report.missing_in_v1.len(),
                missing_in_v2 = report.missing_in_v2.len(),
                divergences = report.divergences.len(),
                source = %report.source,
                "v1 and v2 diverge"
            );
        }
        Ok(report)
    }
}
