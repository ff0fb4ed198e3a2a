//! Trace-level rollup
//!
//! v1 selects traces directly and joins observation statistics. v2 rebuilds
//! each trace from its events: scalar attributes take the earliest non-empty
//! value, timestamps come from min/max over the events.

use super::observations::{observation_stats, total_tokens};
use super::{AggregationCte, RollupKind, RollupOptions, RollupScope};
use crate::sql::expr::{
    AggFunc, Expr, ScalarFn, agg, agg_if, and, coalesce, col, func, int, scalar, string,
};
use crate::sql::query::{FromItem, Select};
use crate::views::SchemaVersion;

const BASE_COLUMNS: &[&str] = &[
    "project_id",
    "id",
    "timestamp",
    "end_time",
    "name",
    "user_id",
    "session_id",
    "release",
    "environment",
    "tags",
    "metadata",
    "observation_count",
    "total_cost",
    "total_tokens",
    "error_count",
];
const PAYLOAD_COLUMNS: &[&str] = &["input", "output"];

fn is_root(alias: &str) -> Expr {
    coalesce(col(alias, "parent_span_id"), string("")).eq(string(""))
}

/// Earliest non-empty value of a string column
fn first_non_empty(alias: &str, column: &str) -> Expr {
    agg_if(
        AggFunc::ArgMin,
        vec![col(alias, column), col(alias, "start_time")],
        col(alias, column).non_empty_string(),
    )
}

/// Trace input from the earliest root event with one
pub fn trace_input_expr(alias: &str) -> Expr {
    agg_if(
        AggFunc::ArgMin,
        vec![col(alias, "input"), col(alias, "start_time")],
        and(vec![is_root(alias), col(alias, "input").non_empty_string()]),
    )
}

/// Trace output from the latest root event with one
pub fn trace_output_expr(alias: &str) -> Expr {
    agg_if(
        AggFunc::ArgMax,
        vec![
            col(alias, "output"),
            coalesce(col(alias, "end_time"), col(alias, "start_time")),
        ],
        and(vec![is_root(alias), col(alias, "output").non_empty_string()]),
    )
}

fn columns(options: &RollupOptions) -> Vec<&'static str> {
    let mut columns = BASE_COLUMNS.to_vec();
    if options.include_payload {
        columns.extend_from_slice(PAYLOAD_COLUMNS);
    }
    columns
}

pub(super) fn traces_rollup(
    version: SchemaVersion,
    scope: &RollupScope,
    options: &RollupOptions,
) -> Vec<AggregationCte> {
    match version {
        SchemaVersion::V1 => {
            let stats = observation_stats(version, scope);
            let traces = select_directly(scope, options);
            vec![stats, traces]
        }
        SchemaVersion::V2 => vec![roll_up_events(scope, options)],
    }
}

/// v1: the traces table already holds one row per trace
fn select_directly(scope: &RollupScope, options: &RollupOptions) -> AggregationCte {
    const T: &str = "t";
    const OST: &str = "ost";

    let mut query = Select::from(FromItem::table("traces", T, true))
        .column(col(T, "project_id"), "project_id")
        .column(col(T, "id"), "id")
        .column(col(T, "timestamp"), "timestamp")
        .column(
            func(
                "greatest",
                vec![coalesce(col(OST, "end_time"), col(T, "timestamp")), col(T, "timestamp")],
            ),
            "end_time",
        )
        .column(col(T, "name"), "name")
        .column(col(T, "user_id"), "user_id")
        .column(col(T, "session_id"), "session_id")
        .column(col(T, "release"), "release")
        .column(col(T, "environment"), "environment")
        .column(col(T, "tags"), "tags")
        .column(col(T, "metadata"), "metadata")
        .column(coalesce(col(OST, "observation_count"), int(0)), "observation_count")
        .column(coalesce(col(OST, "total_cost"), int(0)), "total_cost")
        .column(coalesce(col(OST, "total_tokens"), int(0)), "total_tokens")
        .column(coalesce(col(OST, "error_count"), int(0)), "error_count");

    if options.include_payload {
        query = query
            .column(col(T, "input"), "input")
            .column(col(T, "output"), "output");
    }

    let query = query
        .left_join(
            FromItem::cte(RollupKind::ObservationStats.cte_name(), OST),
            and(vec![
                col(OST, "trace_id").eq(col(T, "id")),
                col(OST, "project_id").eq(col(T, "project_id")),
            ]),
        )
        .filter(and(scope.conditions(T, "timestamp", "id")));

    AggregationCte {
        name: RollupKind::Traces.cte_name(),
        columns: columns(options),
        query,
    }
}

/// v2: group events by trace
fn roll_up_events(scope: &RollupScope, options: &RollupOptions) -> AggregationCte {
    const E: &str = "e";

    let mut query = Select::from(FromItem::table("events", E, false))
        .column(col(E, "project_id"), "project_id")
        .column(col(E, "trace_id"), "id")
        .column(agg(AggFunc::Min, vec![col(E, "start_time")]), "timestamp")
        .column(
            agg(
                AggFunc::Max,
                vec![coalesce(col(E, "end_time"), col(E, "start_time"))],
            ),
            "end_time",
        )
        .column(first_non_empty(E, "trace_name"), "name")
        .column(first_non_empty(E, "user_id"), "user_id")
        .column(first_non_empty(E, "session_id"), "session_id")
        .column(first_non_empty(E, "release"), "release")
        .column(first_non_empty(E, "environment"), "environment")
        .column(
            agg_if(
                AggFunc::ArgMin,
                vec![col(E, "tags"), col(E, "start_time")],
                scalar(ScalarFn::ArrayLength(col(E, "tags"))).gt(int(0)),
            ),
            "tags",
        )
        .column(
            agg_if(
                AggFunc::ArgMin,
                vec![col(E, "metadata"), col(E, "start_time")],
                is_root(E),
            ),
            "metadata",
        )
        .column(agg(AggFunc::Count, vec![int(1)]), "observation_count")
        .column(agg(AggFunc::Sum, vec![col(E, "total_cost")]), "total_cost")
        .column(agg(AggFunc::Sum, vec![total_tokens(E)]), "total_tokens")
        .column(
            agg_if(AggFunc::Count, vec![int(1)], col(E, "level").eq(string("ERROR"))),
            "error_count",
        );

    if options.include_payload {
        query = query
            .column(trace_input_expr(E), "input")
            .column(trace_output_expr(E), "output");
    }

    let query = query
        .filter(and(scope.conditions(E, "start_time", "trace_id")))
        .group_by(col(E, "project_id"))
        .group_by(col(E, "trace_id"));

    AggregationCte {
        name: RollupKind::Traces.cte_name(),
        columns: columns(options),
        query,
    }
}
