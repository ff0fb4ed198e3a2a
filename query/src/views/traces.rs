//! `traces` view
//!
//! v1 reads the traces table and joins per-trace observation statistics on
//! demand. v2 reads the trace rollup, which already carries the statistics.

use super::types::{
    DimensionDecl, MeasureDecl, PayloadDecl, Relation, RelationDecl, SchemaVersion, Source,
    ValueType, ViewDeclaration,
};
use crate::rollups::{RollupKind, trace_input_expr, trace_output_expr};
use crate::sql::expr::{Expr, ScalarFn, and, coalesce, col, func, int, scalar};

const T: &str = "t";
const OST: &str = "ost";
const TSC: &str = "tsc";

pub const NAME: &str = "traces";

fn trace_scores() -> RelationDecl {
    RelationDecl {
        relation: Relation::TraceScores,
        source: Source::Rollup(RollupKind::TraceScores),
        alias: TSC,
        on: and(vec![
            col(TSC, "trace_id").eq(col(T, "id")),
            col(TSC, "project_id").eq(col(T, "project_id")),
        ]),
        entity_keyed: true,
    }
}

/// Dimensions whose expression is identical in both versions
fn shared_dimensions(view: ViewDeclaration) -> ViewDeclaration {
    view.dimension(
        "id",
        DimensionDecl::new(col(T, "id"), ValueType::String)
            .high_cardinality()
            .describe("Trace id"),
    )
    .dimension(
        "timestamp",
        DimensionDecl::new(col(T, "timestamp"), ValueType::Datetime),
    )
    .dimension("input", DimensionDecl::new(col(T, "input"), ValueType::String).payload())
    .dimension("output", DimensionDecl::new(col(T, "output"), ValueType::String).payload())
    .dimension(
        "scores_avg",
        DimensionDecl::new(col(TSC, "scores_avg"), ValueType::ScoreNumbers)
            .requires(Relation::TraceScores)
            .describe("Average value per numeric score name"),
    )
    .dimension(
        "score_categories",
        DimensionDecl::new(col(TSC, "score_categories"), ValueType::ScoreCategories)
            .requires(Relation::TraceScores),
    )
    .measure(
        "count",
        MeasureDecl::new(int(1), ValueType::Integer).describe("Number of traces"),
    )
    .measure(
        "uniqueUserIds",
        MeasureDecl::new(col(T, "user_id"), ValueType::String),
    )
    .measure(
        "uniqueSessionIds",
        MeasureDecl::new(col(T, "session_id"), ValueType::String),
    )
    .relation(trace_scores())
}

/// Trace attributes. In v2 they are copied onto every event at ingestion.
fn attribute_dimensions(view: ViewDeclaration, denormalized: bool) -> ViewDeclaration {
    let dim = |sql: Expr, value_type: ValueType| {
        let decl = DimensionDecl::new(sql, value_type);
        if denormalized { decl.denormalized() } else { decl }
    };
    view.dimension("name", dim(col(T, "name"), ValueType::String))
        .dimension("userId", dim(col(T, "user_id"), ValueType::String).high_cardinality())
        .dimension(
            "sessionId",
            dim(col(T, "session_id"), ValueType::String).high_cardinality(),
        )
        .dimension("release", dim(col(T, "release"), ValueType::String))
        .dimension("environment", dim(col(T, "environment"), ValueType::String))
        .dimension("tags", dim(col(T, "tags"), ValueType::StringArray))
        .dimension("metadata", dim(col(T, "metadata"), ValueType::StringMap))
}

pub fn v1() -> ViewDeclaration {
    let stat = |column: &str| coalesce(col(OST, column), int(0));
    let end_time = func(
        "greatest",
        vec![coalesce(col(OST, "end_time"), col(T, "timestamp")), col(T, "timestamp")],
    );

    let view = ViewDeclaration::new(
        NAME,
        SchemaVersion::V1,
        Source::Table {
            name: "traces",
            replacing: true,
        },
        T,
        col(T, "timestamp"),
    )
    .describe("One row per trace");

    attribute_dimensions(shared_dimensions(view), false)
        .measure(
            "observationsCount",
            MeasureDecl::new(stat("observation_count"), ValueType::Integer)
                .requires(Relation::ObservationStats),
        )
        .measure(
            "latency",
            MeasureDecl::new(
                scalar(ScalarFn::DurationMs {
                    start: col(T, "timestamp"),
                    end: end_time,
                }),
                ValueType::Decimal,
            )
            .requires(Relation::ObservationStats)
            .describe("Milliseconds from trace start to the last observation end"),
        )
        .measure(
            "totalCost",
            MeasureDecl::new(stat("total_cost"), ValueType::Decimal)
                .requires(Relation::ObservationStats),
        )
        .measure(
            "totalTokens",
            MeasureDecl::new(stat("total_tokens"), ValueType::Integer)
                .requires(Relation::ObservationStats),
        )
        .measure(
            "errorCount",
            MeasureDecl::new(stat("error_count"), ValueType::Integer)
                .requires(Relation::ObservationStats),
        )
        .relation(RelationDecl {
            relation: Relation::ObservationStats,
            source: Source::Rollup(RollupKind::ObservationStats),
            alias: OST,
            on: and(vec![
                col(OST, "trace_id").eq(col(T, "id")),
                col(OST, "project_id").eq(col(T, "project_id")),
            ]),
            entity_keyed: true,
        })
        .payload(PayloadDecl {
            table: "traces",
            replacing: true,
            key: "id",
            time_column: "timestamp",
            columns: vec![("input", col("p", "input")), ("output", col("p", "output"))],
            grouped: false,
        })
}

pub fn v2() -> ViewDeclaration {
    let view = ViewDeclaration::new(
        NAME,
        SchemaVersion::V2,
        Source::Rollup(RollupKind::Traces),
        T,
        col(T, "timestamp"),
    )
    .describe("One row per trace, rebuilt from events");

    attribute_dimensions(shared_dimensions(view), true)
        .measure(
            "observationsCount",
            MeasureDecl::new(col(T, "observation_count"), ValueType::Integer),
        )
        .measure(
            "latency",
            MeasureDecl::new(
                scalar(ScalarFn::DurationMs {
                    start: col(T, "timestamp"),
                    end: col(T, "end_time"),
                }),
                ValueType::Decimal,
            ),
        )
        .measure(
            "totalCost",
            MeasureDecl::new(col(T, "total_cost"), ValueType::Decimal),
        )
        .measure(
            "totalTokens",
            MeasureDecl::new(col(T, "total_tokens"), ValueType::Integer),
        )
        .measure(
            "errorCount",
            MeasureDecl::new(col(T, "error_count"), ValueType::Integer),
        )
        .payload(PayloadDecl {
            table: "events",
            replacing: false,
            key: "trace_id",
            time_column: "start_time",
            columns: vec![("input", trace_input_expr("p")), ("output", trace_output_expr("p"))],
            grouped: true,
        })
}
