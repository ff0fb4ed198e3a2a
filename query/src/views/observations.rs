//! `observations` view

use super::types::{
    DimensionDecl, MeasureDecl, OrdinalDecl, PayloadDecl, Relation, RelationDecl, SchemaVersion,
    Source, ValueType, ViewDeclaration,
};
use crate::rollups::{RollupKind, total_tokens};
use crate::sql::expr::{Expr, ScalarFn, and, col, int, scalar, string};

const O: &str = "o";
const T: &str = "t";
const OSC: &str = "osc";

pub const NAME: &str = "observations";

fn usage(key: &'static str) -> Expr {
    scalar(ScalarFn::MapValue {
        map: col(O, "usage_details"),
        key: string(key),
    })
}

fn observation_scores(key: &str) -> RelationDecl {
    RelationDecl {
        relation: Relation::ObservationScores,
        source: Source::Rollup(RollupKind::ObservationScores),
        alias: OSC,
        on: and(vec![
            col(OSC, "observation_id").eq(col(O, key)),
            col(OSC, "project_id").eq(col(O, "project_id")),
        ]),
        entity_keyed: true,
    }
}

/// Fields stored under the same column name in both layouts
fn shared(view: ViewDeclaration) -> ViewDeclaration {
    view.dimension(
        "traceId",
        DimensionDecl::new(col(O, "trace_id"), ValueType::String).high_cardinality(),
    )
    .dimension("name", DimensionDecl::new(col(O, "name"), ValueType::String))
    .dimension("type", DimensionDecl::new(col(O, "type"), ValueType::String))
    .dimension("level", DimensionDecl::new(col(O, "level"), ValueType::String))
    .dimension(
        "environment",
        DimensionDecl::new(col(O, "environment"), ValueType::String),
    )
    .dimension(
        "providedModelName",
        DimensionDecl::new(col(O, "provided_model_name"), ValueType::String),
    )
    .dimension(
        "promptName",
        DimensionDecl::new(col(O, "prompt_name"), ValueType::String),
    )
    .dimension("version", DimensionDecl::new(col(O, "version"), ValueType::String))
    .dimension(
        "startTime",
        DimensionDecl::new(col(O, "start_time"), ValueType::Datetime),
    )
    .dimension(
        "metadata",
        DimensionDecl::new(col(O, "metadata"), ValueType::StringMap),
    )
    .dimension(
        "usageDetails",
        DimensionDecl::new(col(O, "usage_details"), ValueType::NumberMap),
    )
    .dimension("input", DimensionDecl::new(col(O, "input"), ValueType::String).payload())
    .dimension("output", DimensionDecl::new(col(O, "output"), ValueType::String).payload())
    .dimension(
        "scores_avg",
        DimensionDecl::new(col(OSC, "scores_avg"), ValueType::ScoreNumbers)
            .requires(Relation::ObservationScores),
    )
    .dimension(
        "score_categories",
        DimensionDecl::new(col(OSC, "score_categories"), ValueType::ScoreCategories)
            .requires(Relation::ObservationScores),
    )
    .measure("count", MeasureDecl::new(int(1), ValueType::Integer))
    .measure(
        "latency",
        MeasureDecl::new(
            scalar(ScalarFn::DurationMs {
                start: col(O, "start_time"),
                end: col(O, "end_time"),
            }),
            ValueType::Decimal,
        )
        .describe("Milliseconds from start to end"),
    )
    .measure(
        "timeToFirstToken",
        MeasureDecl::new(
            scalar(ScalarFn::DurationMs {
                start: col(O, "start_time"),
                end: col(O, "completion_start_time"),
            }),
            ValueType::Decimal,
        ),
    )
    .measure(
        "totalCost",
        MeasureDecl::new(col(O, "total_cost"), ValueType::Decimal),
    )
    .measure("inputTokens", MeasureDecl::new(usage("input"), ValueType::Integer))
    .measure("outputTokens", MeasureDecl::new(usage("output"), ValueType::Integer))
    .measure("totalTokens", MeasureDecl::new(total_tokens(O), ValueType::Integer))
    .measure(
        "uniqueTraceIds",
        MeasureDecl::new(col(O, "trace_id"), ValueType::String),
    )
}

/// Siblings share a trace and are ranked by start time, then key
fn ordinal(
    table: &'static str,
    replacing: bool,
    key: &'static str,
    order_by: &'static [&'static str],
) -> OrdinalDecl {
    OrdinalDecl {
        table,
        replacing,
        key,
        partition_by: "trace_id",
        order_by,
        time_column: "start_time",
    }
}

fn payload(table: &'static str, replacing: bool, key: &'static str) -> PayloadDecl {
    PayloadDecl {
        table,
        replacing,
        key,
        time_column: "start_time",
        columns: vec![("input", col("p", "input")), ("output", col("p", "output"))],
        grouped: false,
    }
}

pub fn v1() -> ViewDeclaration {
    let view = ViewDeclaration::new(
        NAME,
        SchemaVersion::V1,
        Source::Table {
            name: "observations",
            replacing: true,
        },
        O,
        col(O, "start_time"),
    )
    .describe("One row per observation");

    shared(view)
        .dimension(
            "id",
            DimensionDecl::new(col(O, "id"), ValueType::String).high_cardinality(),
        )
        .dimension(
            "parentObservationId",
            DimensionDecl::new(col(O, "parent_observation_id"), ValueType::String)
                .high_cardinality(),
        )
        .dimension(
            "positionInTrace",
            DimensionDecl::new(col(O, "id"), ValueType::Ordinal)
                .describe("1-based position among the trace's observations by start time"),
        )
        .dimension(
            "traceName",
            DimensionDecl::new(col(T, "name"), ValueType::String).requires(Relation::ParentTrace),
        )
        .dimension(
            "userId",
            DimensionDecl::new(col(T, "user_id"), ValueType::String)
                .high_cardinality()
                .requires(Relation::ParentTrace),
        )
        .dimension(
            "sessionId",
            DimensionDecl::new(col(T, "session_id"), ValueType::String)
                .high_cardinality()
                .requires(Relation::ParentTrace),
        )
        .dimension(
            "tags",
            DimensionDecl::new(col(T, "tags"), ValueType::StringArray)
                .requires(Relation::ParentTrace),
        )
        .measure(
            "uniqueUserIds",
            MeasureDecl::new(col(T, "user_id"), ValueType::String)
                .requires(Relation::ParentTrace),
        )
        .relation(RelationDecl {
            relation: Relation::ParentTrace,
            source: Source::Table {
                name: "traces",
                replacing: true,
            },
            alias: T,
            on: and(vec![
                col(T, "id").eq(col(O, "trace_id")),
                col(T, "project_id").eq(col(O, "project_id")),
            ]),
            entity_keyed: false,
        })
        .relation(observation_scores("id"))
        .ordinal(ordinal("observations", true, "id", &["start_time", "id"]))
        .payload(payload("observations", true, "id"))
}

pub fn v2() -> ViewDeclaration {
    let view = ViewDeclaration::new(
        NAME,
        SchemaVersion::V2,
        Source::Table {
            name: "events",
            replacing: false,
        },
        O,
        col(O, "start_time"),
    )
    .describe("One row per event");

    shared(view)
        .dimension(
            "id",
            DimensionDecl::new(col(O, "span_id"), ValueType::String).high_cardinality(),
        )
        .dimension(
            "parentObservationId",
            DimensionDecl::new(col(O, "parent_span_id"), ValueType::String).high_cardinality(),
        )
        .dimension(
            "positionInTrace",
            DimensionDecl::new(col(O, "span_id"), ValueType::Ordinal),
        )
        .dimension(
            "traceName",
            DimensionDecl::new(col(O, "trace_name"), ValueType::String).denormalized(),
        )
        .dimension(
            "userId",
            DimensionDecl::new(col(O, "user_id"), ValueType::String)
                .high_cardinality()
                .denormalized(),
        )
        .dimension(
            "sessionId",
            DimensionDecl::new(col(O, "session_id"), ValueType::String)
                .high_cardinality()
                .denormalized(),
        )
        .dimension(
            "tags",
            DimensionDecl::new(col(O, "tags"), ValueType::StringArray).denormalized(),
        )
        .measure(
            "uniqueUserIds",
            MeasureDecl::new(col(O, "user_id"), ValueType::String),
        )
        .relation(observation_scores("span_id"))
        .ordinal(ordinal("events", false, "span_id", &["start_time", "span_id"]))
        .payload(payload("events", false, "span_id"))
}
