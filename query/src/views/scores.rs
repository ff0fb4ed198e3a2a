//! `scores-numeric` and `scores-categorical` views
//!
//! Both read the scores table in either layout. They differ in the data-type
//! predicate and in which value fields they expose. The parent trace is the
//! traces table in v1 and the trace rollup in v2.

use super::types::{
    DimensionDecl, MeasureDecl, Relation, RelationDecl, SchemaVersion, Source, ValueType,
    ViewDeclaration,
};
use crate::rollups::{RollupKind, categorical_data_type, numeric_data_type};
use crate::sql::expr::{and, col, int, raw};

const S: &str = "s";
const T: &str = "t";

pub const NUMERIC: &str = "scores-numeric";
pub const CATEGORICAL: &str = "scores-categorical";

fn parent_trace(version: SchemaVersion) -> RelationDecl {
    let source = match version {
        SchemaVersion::V1 => Source::Table {
            name: "traces",
            replacing: true,
        },
        SchemaVersion::V2 => Source::Rollup(RollupKind::Traces),
    };
    RelationDecl {
        relation: Relation::ParentTrace,
        source,
        alias: T,
        on: and(vec![
            col(T, "id").eq(col(S, "trace_id")),
            col(T, "project_id").eq(col(S, "project_id")),
        ]),
        entity_keyed: false,
    }
}

fn base(name: &'static str, version: SchemaVersion) -> ViewDeclaration {
    let denormalized = version == SchemaVersion::V2;
    let trace_dim = |column: &str, value_type: ValueType| {
        let decl = DimensionDecl::new(col(T, column), value_type).requires(Relation::ParentTrace);
        if denormalized { decl.denormalized() } else { decl }
    };

    ViewDeclaration::new(
        name,
        version,
        Source::Table {
            name: "scores",
            replacing: true,
        },
        S,
        col(S, "timestamp"),
    )
    .dimension(
        "id",
        DimensionDecl::new(col(S, "id"), ValueType::String).high_cardinality(),
    )
    .dimension("name", DimensionDecl::new(col(S, "name"), ValueType::String))
    .dimension("source", DimensionDecl::new(col(S, "source"), ValueType::String))
    .dimension(
        "dataType",
        DimensionDecl::new(col(S, "data_type"), ValueType::String),
    )
    .dimension(
        "traceId",
        DimensionDecl::new(col(S, "trace_id"), ValueType::String).high_cardinality(),
    )
    .dimension(
        "observationId",
        DimensionDecl::new(col(S, "observation_id"), ValueType::String).high_cardinality(),
    )
    .dimension(
        "level",
        DimensionDecl::new(
            raw("CASE WHEN s.observation_id IS NULL THEN 'trace' ELSE 'observation' END"),
            ValueType::String,
        )
        .describe("Whether the score is attached to a trace or an observation"),
    )
    .dimension(
        "environment",
        DimensionDecl::new(col(S, "environment"), ValueType::String),
    )
    .dimension(
        "timestamp",
        DimensionDecl::new(col(S, "timestamp"), ValueType::Datetime),
    )
    .dimension("traceName", trace_dim("name", ValueType::String))
    .dimension(
        "userId",
        trace_dim("user_id", ValueType::String).high_cardinality(),
    )
    .dimension("tags", trace_dim("tags", ValueType::StringArray))
    .measure("count", MeasureDecl::new(int(1), ValueType::Integer))
    .measure(
        "uniqueTraceIds",
        MeasureDecl::new(col(S, "trace_id"), ValueType::String),
    )
    .relation(parent_trace(version))
}

pub fn numeric(version: SchemaVersion) -> ViewDeclaration {
    base(NUMERIC, version)
        .describe("Numeric and boolean scores")
        .base_predicate(numeric_data_type(S))
        .measure(
            "value",
            MeasureDecl::new(col(S, "value"), ValueType::Decimal).describe("Score value"),
        )
}

pub fn categorical(version: SchemaVersion) -> ViewDeclaration {
    base(CATEGORICAL, version)
        .describe("Categorical scores")
        .base_predicate(categorical_data_type(S))
        .dimension(
            "stringValue",
            DimensionDecl::new(col(S, "string_value"), ValueType::String),
        )
        .measure(
            "categoryCount",
            MeasureDecl::new(int(1), ValueType::CategoryCount)
                .describe("Rows per category, summed into a distribution"),
        )
}
