//! `sessions` view, read from the session rollup in both layouts

use super::types::{
    DimensionDecl, MeasureDecl, SchemaVersion, Source, ValueType, ViewDeclaration,
};
use crate::rollups::RollupKind;
use crate::sql::expr::{ScalarFn, col, int, scalar};

const S: &str = "s";

pub const NAME: &str = "sessions";

pub fn declaration(version: SchemaVersion) -> ViewDeclaration {
    // Session attributes come from trace attributes, which v2 denormalizes
    let denormalized = version == SchemaVersion::V2;
    let dim = |column: &str, value_type: ValueType| {
        let decl = DimensionDecl::new(col(S, column), value_type);
        if denormalized { decl.denormalized() } else { decl }
    };

    ViewDeclaration::new(
        NAME,
        version,
        Source::Rollup(RollupKind::Sessions),
        S,
        col(S, "start_time"),
    )
    .describe("One row per session")
    .dimension(
        "id",
        DimensionDecl::new(col(S, "id"), ValueType::String)
            .high_cardinality()
            .describe("Session id"),
    )
    .dimension("environment", dim("environment", ValueType::String))
    .dimension("userIds", dim("user_ids", ValueType::StringArray))
    .dimension("tags", dim("tags", ValueType::StringArray))
    .dimension(
        "startTime",
        DimensionDecl::new(col(S, "start_time"), ValueType::Datetime),
    )
    .measure("count", MeasureDecl::new(int(1), ValueType::Integer))
    .measure(
        "traceCount",
        MeasureDecl::new(col(S, "trace_count"), ValueType::Integer),
    )
    .measure(
        "duration",
        MeasureDecl::new(
            scalar(ScalarFn::DurationMs {
                start: col(S, "start_time"),
                end: col(S, "end_time"),
            }),
            ValueType::Decimal,
        ),
    )
    .measure(
        "totalCost",
        MeasureDecl::new(col(S, "total_cost"), ValueType::Decimal),
    )
    .measure(
        "totalTokens",
        MeasureDecl::new(col(S, "total_tokens"), ValueType::Integer),
    )
    .measure(
        "observationsCount",
        MeasureDecl::new(col(S, "observation_count"), ValueType::Integer),
    )
}
