//! Query safety validation
//!
//! Grouping by a high-cardinality dimension is only allowed when the result is
//! bounded by a row limit and ranked by one of the query's own metrics, so the
//! limit keeps the top rows rather than an arbitrary slice.

use crate::compiler::{DeclarativeQuery, SortDirection};
use crate::error::SafetyViolation;
use crate::views::ViewDeclaration;

pub fn validate(query: &DeclarativeQuery, view: &ViewDeclaration) -> Result<(), SafetyViolation> {
    let high_cardinality_dimensions: Vec<String> = query
        .dimensions
        .iter()
        .filter(|d| {
            view.get_dimension(&d.field)
                .is_some_and(|decl| decl.high_cardinality)
        })
        .map(|d| d.field.clone())
        .collect();
    if high_cardinality_dimensions.is_empty() {
        return Ok(());
    }

    let metric_aliases: Vec<String> = query.metrics.iter().map(|m| m.alias()).collect();
    let ranks_by_metric = |field: &str, direction: SortDirection| {
        direction == SortDirection::Desc && metric_aliases.iter().any(|a| a == field)
    };

    let invalid_order_by_fields: Vec<String> = query
        .orderings()
        .iter()
        .filter(|o| !ranks_by_metric(&o.field, o.direction))
        .map(|o| o.field.clone())
        .collect();
    let missing_metric_order = !query
        .orderings()
        .iter()
        .any(|o| ranks_by_metric(&o.field, o.direction));
    let missing_row_limit = query.limit().is_none();

    if missing_row_limit || missing_metric_order {
        return Err(SafetyViolation {
            high_cardinality_dimensions,
            invalid_order_by_fields,
            missing_row_limit,
            missing_metric_order,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::{Aggregation, SchemaVersion, ViewRegistry};
    use chrono::{TimeZone, Utc};

    fn query() -> DeclarativeQuery {
        DeclarativeQuery::new(
            "traces",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .dimension("userId")
        .metric("count", Aggregation::Count)
    }

    fn check(query: &DeclarativeQuery) -> Result<(), SafetyViolation> {
        let registry = ViewRegistry::builtin();
        validate(query, registry.resolve("traces", SchemaVersion::V1).unwrap())
    }

    #[test]
    fn test_rejects_unbounded_high_cardinality_grouping() {
        let violation = check(&query()).unwrap_err();
        assert_eq!(violation.high_cardinality_dimensions, vec!["userId"]);
        assert!(violation.missing_row_limit);
        assert!(violation.missing_metric_order);
    }

    #[test]
    fn test_accepts_limit_and_descending_metric() {
        let q = query()
            .row_limit(100)
            .order_by("count_count", SortDirection::Desc);
        assert!(check(&q).is_ok());
    }

    #[test]
    fn test_limit_alone_is_not_enough() {
        let violation = check(&query().row_limit(100)).unwrap_err();
        assert!(!violation.missing_row_limit);
        assert!(violation.missing_metric_order);
    }

    #[test]
    fn test_reports_invalid_order_fields() {
        let q = query()
            .row_limit(100)
            .order_by("count_count", SortDirection::Asc)
            .order_by("userId", SortDirection::Desc);
        let violation = check(&q).unwrap_err();
        assert_eq!(violation.invalid_order_by_fields, vec!["count_count", "userId"]);
    }

    #[test]
    fn test_low_cardinality_needs_nothing() {
        let q = DeclarativeQuery::new(
            "traces",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .dimension("name")
        .metric("count", Aggregation::Count);
        assert!(check(&q).is_ok());
    }
}
