//! Session-level rollup, layered on the trace rollup

use super::{AggregationCte, RollupKind, RollupScope};
use crate::scope::project_param;
use crate::sql::expr::{AggFunc, agg, and, col, int, param};
use crate::sql::query::{FromItem, Select};
use crate::sql::Param;

const TR: &str = "tr";

pub(super) fn sessions_rollup(scope: &RollupScope) -> AggregationCte {
    let mut conditions = vec![
        col(TR, "project_id").eq(project_param(&scope.project_id)),
        col(TR, "session_id").is_not_null(),
        col(TR, "session_id").non_empty_string(),
    ];
    if let Some(ids) = &scope.entity_ids {
        conditions.push(col(TR, "session_id").in_list(
            ids.iter()
                .map(|id| param(Param::hint("entityId", id.as_str())))
                .collect(),
            false,
        ));
    }

    let query = Select::from(FromItem::cte(RollupKind::Traces.cte_name(), TR))
        .column(col(TR, "project_id"), "project_id")
        .column(col(TR, "session_id"), "id")
        .column(agg(AggFunc::Min, vec![col(TR, "timestamp")]), "start_time")
        .column(agg(AggFunc::Max, vec![col(TR, "end_time")]), "end_time")
        .column(agg(AggFunc::Count, vec![int(1)]), "trace_count")
        .column(agg(AggFunc::DistinctList, vec![col(TR, "user_id")]), "user_ids")
        .column(
            agg(
                AggFunc::ArgMin,
                vec![col(TR, "environment"), col(TR, "timestamp")],
            ),
            "environment",
        )
        .column(agg(AggFunc::DistinctFlatten, vec![col(TR, "tags")]), "tags")
        .column(agg(AggFunc::Sum, vec![col(TR, "total_cost")]), "total_cost")
        .column(agg(AggFunc::Sum, vec![col(TR, "total_tokens")]), "total_tokens")
        .column(
            agg(AggFunc::Sum, vec![col(TR, "observation_count")]),
            "observation_count",
        )
        .filter(and(conditions))
        .group_by(col(TR, "project_id"))
        .group_by(col(TR, "session_id"));

    AggregationCte {
        name: RollupKind::Sessions.cte_name(),
        columns: vec![
            "project_id",
            "id",
            "start_time",
            "end_time",
            "trace_count",
            "user_ids",
            "environment",
            "tags",
            "total_cost",
            "total_tokens",
            "observation_count",
        ],
        query,
    }
}
