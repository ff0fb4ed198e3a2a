//! Per-trace observation statistics

use super::{AggregationCte, RollupKind, RollupScope};
use crate::sql::expr::{AggFunc, ScalarFn, agg, agg_if, and, coalesce, col, int, scalar, string};
use crate::sql::query::{FromItem, Select};
use crate::views::SchemaVersion;

const ALIAS: &str = "o";

/// Observation rows: the observations table in v1, the events table in v2
pub(crate) fn observation_source(version: SchemaVersion) -> FromItem {
    match version {
        SchemaVersion::V1 => FromItem::table("observations", ALIAS, true),
        SchemaVersion::V2 => FromItem::table("events", ALIAS, false),
    }
}

pub fn total_tokens(alias: &str) -> crate::sql::expr::Expr {
    scalar(ScalarFn::MapValue {
        map: col(alias, "usage_details"),
        key: string("total"),
    })
}

pub(super) fn observation_stats(version: SchemaVersion, scope: &RollupScope) -> AggregationCte {
    let query = Select::from(observation_source(version))
        .column(col(ALIAS, "project_id"), "project_id")
        .column(col(ALIAS, "trace_id"), "trace_id")
        .column(agg(AggFunc::Count, vec![int(1)]), "observation_count")
        .column(agg(AggFunc::Min, vec![col(ALIAS, "start_time")]), "start_time")
        .column(
            agg(
                AggFunc::Max,
                vec![coalesce(col(ALIAS, "end_time"), col(ALIAS, "start_time"))],
            ),
            "end_time",
        )
        .column(agg(AggFunc::Sum, vec![col(ALIAS, "total_cost")]), "total_cost")
        .column(agg(AggFunc::Sum, vec![total_tokens(ALIAS)]), "total_tokens")
        .column(
            agg_if(
                AggFunc::Count,
                vec![int(1)],
                col(ALIAS, "level").eq(string("ERROR")),
            ),
            "error_count",
        )
        .filter(and(scope.conditions(ALIAS, "start_time", "trace_id")))
        .group_by(col(ALIAS, "project_id"))
        .group_by(col(ALIAS, "trace_id"));

    AggregationCte {
        name: RollupKind::ObservationStats.cte_name(),
        columns: vec![
            "project_id",
            "trace_id",
            "observation_count",
            "start_time",
            "end_time",
            "total_cost",
            "total_tokens",
            "error_count",
        ],
        query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{ClickhouseDialect, DuckdbDialect, Renderer};

    #[test]
    fn test_v1_reads_observations_final() {
        let cte = observation_stats(SchemaVersion::V1, &RollupScope::new("p1"));
        let sql = Renderer::render_select(&ClickhouseDialect, &cte.query).sql;
        assert!(sql.contains("FROM observations AS o FINAL"));
        assert!(sql.contains("countIf(o.level = 'ERROR') AS error_count"));
        assert!(sql.contains("sum(o.usage_details['total']) AS total_tokens"));
        assert!(sql.ends_with("GROUP BY o.project_id, o.trace_id"));
    }

    #[test]
    fn test_v2_reads_events() {
        let cte = observation_stats(SchemaVersion::V2, &RollupScope::new("p1"));
        let sql = Renderer::render_select(&DuckdbDialect, &cte.query).sql;
        assert!(sql.contains("FROM events AS o\n"));
        assert!(sql.contains("count(1) FILTER (WHERE o.level = 'ERROR') AS error_count"));
    }
}
