//! Aggregation CTE builders
//!
//! Each builder returns named sub-queries with a fixed output schema. Builders
//! that depend on another rollup return the dependency first so the list can be
//! appended to a WITH clause as is.

mod observations;
mod scores;
mod sessions;
mod traces;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scope::{from_param, project_param};
use crate::sql::expr::{Expr, col, param};
use crate::sql::query::{Cte, Select};
use crate::sql::Param;
use crate::views::SchemaVersion;

pub use scores::{ScoreLevel, categorical_data_type, numeric_data_type};
pub use observations::total_tokens;
pub use traces::{trace_input_expr, trace_output_expr};

/// Rollups a view or relation can be built on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupKind {
    ObservationStats,
    Traces,
    Sessions,
    TraceScores,
    ObservationScores,
}

impl RollupKind {
    pub fn cte_name(&self) -> &'static str {
        match self {
            RollupKind::ObservationStats => "observation_stats",
            RollupKind::Traces => "traces_rollup",
            RollupKind::Sessions => "sessions_rollup",
            RollupKind::TraceScores => "trace_scores",
            RollupKind::ObservationScores => "observation_scores",
        }
    }
}

/// Bounds applied inside a rollup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollupScope {
    pub project_id: String,
    /// Restrict to these entity keys
    pub entity_ids: Option<Vec<String>>,
    /// Skip source rows older than this
    pub lower_bound: Option<DateTime<Utc>>,
}

impl RollupScope {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            entity_ids: None,
            lower_bound: None,
        }
    }

    pub fn with_entity_ids(mut self, ids: Option<Vec<String>>) -> Self {
        self.entity_ids = ids;
        self
    }

    pub fn with_lower_bound(mut self, bound: Option<DateTime<Utc>>) -> Self {
        self.lower_bound = bound;
        self
    }

    pub fn without_entity_ids(&self) -> Self {
        Self {
            entity_ids: None,
            ..self.clone()
        }
    }

    /// Project, lower-bound and allow-list predicates over one source alias
    pub(crate) fn conditions(&self, alias: &str, time_column: &str, key_column: &str) -> Vec<Expr> {
        let mut conditions = vec![col(alias, "project_id").eq(project_param(&self.project_id))];
        if let Some(bound) = self.lower_bound {
            conditions.push(col(alias, time_column).gt_eq(from_param(bound)));
        }
        if let Some(ids) = &self.entity_ids {
            conditions.push(col(alias, key_column).in_list(
                ids.iter()
                    .map(|id| param(Param::hint("entityId", id.as_str())))
                    .collect(),
                false,
            ));
        }
        conditions
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupOptions {
    /// Include payload columns (`input`, `output`) where the rollup has them
    pub include_payload: bool,
}

/// A named sub-query with a declared output schema
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationCte {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
    pub query: Select,
}

impl AggregationCte {
    pub fn into_cte(self) -> Cte {
        Cte {
            name: self.name.to_string(),
            query: self.query,
        }
    }
}

/// Build a rollup and everything it depends on, dependencies first.
///
/// The entity-id allow-list applies only to the requested rollup.
pub fn build_rollup(
    kind: RollupKind,
    version: SchemaVersion,
    scope: &RollupScope,
    options: &RollupOptions,
) -> Vec<AggregationCte> {
    match kind {
        RollupKind::ObservationStats => vec![observations::observation_stats(version, scope)],
        RollupKind::Traces => traces::traces_rollup(version, scope, options),
        RollupKind::Sessions => {
            let mut ctes = traces::traces_rollup(
                version,
                &scope.without_entity_ids(),
                &RollupOptions::default(),
            );
            ctes.push(sessions::sessions_rollup(scope));
            ctes
        }
        RollupKind::TraceScores => vec![scores::score_rollup(ScoreLevel::Trace, scope)],
        RollupKind::ObservationScores => {
            vec![scores::score_rollup(ScoreLevel::Observation, scope)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{ClickhouseDialect, Renderer};

    fn all_kinds() -> [RollupKind; 5] {
        [
            RollupKind::ObservationStats,
            RollupKind::Traces,
            RollupKind::Sessions,
            RollupKind::TraceScores,
            RollupKind::ObservationScores,
        ]
    }

    #[test]
    fn test_declared_schema_matches_select_list() {
        let scope = RollupScope::new("p1");
        for version in [SchemaVersion::V1, SchemaVersion::V2] {
            for kind in all_kinds() {
                for include_payload in [false, true] {
                    let options = RollupOptions { include_payload };
                    for cte in build_rollup(kind, version, &scope, &options) {
                        assert_eq!(
                            cte.columns,
                            cte.query.output_columns(),
                            "{} {:?}",
                            cte.name,
                            version
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_requested_rollup_is_last() {
        let scope = RollupScope::new("p1");
        for version in [SchemaVersion::V1, SchemaVersion::V2] {
            for kind in all_kinds() {
                let ctes = build_rollup(kind, version, &scope, &RollupOptions::default());
                assert_eq!(ctes.last().map(|c| c.name), Some(kind.cte_name()));
            }
        }
    }

    #[test]
    fn test_sessions_layer_on_traces_rollup() {
        let scope = RollupScope::new("p1").with_entity_ids(Some(vec!["s1".into()]));
        let ctes = build_rollup(
            RollupKind::Sessions,
            SchemaVersion::V2,
            &scope,
            &RollupOptions::default(),
        );
        let names: Vec<_> = ctes.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["traces_rollup", "sessions_rollup"]);

        // Allow-list applies to sessions only, never to the underlying traces
        let traces_sql = Renderer::render_select(&ClickhouseDialect, &ctes[0].query).sql;
        assert!(!traces_sql.contains("entityId"));
        let sessions_sql = Renderer::render_select(&ClickhouseDialect, &ctes[1].query).sql;
        assert!(sessions_sql.contains("FROM traces_rollup AS tr"));
        assert!(sessions_sql.contains("tr.session_id IN ({entityId_0: String})"));
    }

    #[test]
    fn test_scope_conditions() {
        let scope = RollupScope::new("p1")
            .with_lower_bound(Some(chrono::Utc::now()))
            .with_entity_ids(Some(vec!["a".into(), "b".into()]));
        let cond = crate::sql::expr::and(scope.conditions("e", "start_time", "trace_id"));
        let rendered = Renderer::render_expr(&ClickhouseDialect, &cond);
        assert_eq!(
            rendered.sql,
            "e.project_id = {projectId: String} AND e.start_time >= {fromTimestamp: DateTime64(3)} \
             AND e.trace_id IN ({entityId_0: String}, {entityId_1: String})"
        );
        assert_eq!(rendered.params.len(), 4);
    }
}
