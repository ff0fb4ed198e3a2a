//! Filter parsing
//!
//! Parses JSON filter definitions and checks them against a view.

use super::list::FilterList;
use super::types::Filter;
use crate::error::QueryError;
use crate::views::ViewDeclaration;

/// Maximum size of filter JSON in bytes (64KB)
pub const MAX_FILTER_JSON_SIZE: usize = 64 * 1024;

/// Maximum number of filters allowed
pub const MAX_FILTERS: usize = 50;

/// Parse filters from JSON
///
/// Validates JSON size, parses into Filter structs, and validates columns.
pub fn parse_filters(json_str: &str, view: &ViewDeclaration) -> Result<FilterList, QueryError> {
    parse_filters_with_limit(json_str, view, MAX_FILTERS)
}

pub fn parse_filters_with_limit(
    json_str: &str,
    view: &ViewDeclaration,
    max_filters: usize,
) -> Result<FilterList, QueryError> {
    if json_str.len() > MAX_FILTER_JSON_SIZE {
        return Err(QueryError::invalid_filter(
            "filters",
            format!(
                "Filter JSON exceeds maximum size of {} bytes",
                MAX_FILTER_JSON_SIZE
            ),
        ));
    }

    let filters: Vec<Filter> = serde_json::from_str(json_str)
        .map_err(|e| QueryError::invalid_filter("filters", e.to_string()))?;

    check_filters(&filters, view, max_filters)?;
    Ok(FilterList::new(filters))
}

/// Size check for filters that arrived inside a whole query rather than as
/// standalone filter JSON. Measured on the compact encoding.
pub fn check_filter_size(filters: &FilterList) -> Result<(), QueryError> {
    let size = serde_json::to_vec(filters)
        .map_err(|e| QueryError::invalid_filter("filters", e.to_string()))?
        .len();
    if size > MAX_FILTER_JSON_SIZE {
        return Err(QueryError::invalid_filter(
            "filters",
            format!(
                "Filter JSON exceeds maximum size of {} bytes",
                MAX_FILTER_JSON_SIZE
            ),
        ));
    }
    Ok(())
}

/// Count and column checks shared with queries deserialized elsewhere
pub fn check_filters<'a>(
    filters: impl IntoIterator<Item = &'a Filter>,
    view: &ViewDeclaration,
    max_filters: usize,
) -> Result<(), QueryError> {
    let mut count = 0;
    for filter in filters {
        count += 1;
        if count > max_filters {
            return Err(QueryError::invalid_filter(
                "filters",
                format!("Maximum {} filters allowed", max_filters),
            ));
        }
        filter.validate(view)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::{SchemaVersion, ViewRegistry};

    fn traces() -> ViewDeclaration {
        ViewRegistry::builtin()
            .resolve("traces", SchemaVersion::V1)
            .unwrap()
            .clone()
    }

    #[test]
    fn parse_filters_valid_json() {
        let json = r#"[
            {"type": "string", "column": "name", "operator": "=", "value": "abc123"}
        ]"#;
        let result = parse_filters(json, &traces());
        assert_eq!(result.unwrap().len(), 1);
    }

    #[test]
    fn parse_filters_multiple() {
        let json = r#"[
            {"type": "string_options", "column": "environment", "operator": "any of", "value": ["prod", "dev"]},
            {"type": "number", "column": "latency", "operator": ">", "value": 100},
            {"type": "array_options", "column": "tags", "operator": "all of", "value": ["a"]}
        ]"#;
        assert_eq!(parse_filters(json, &traces()).unwrap().len(), 3);
    }

    #[test]
    fn parse_filters_invalid_json() {
        let err = parse_filters("not valid json", &traces()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter { .. }));
    }

    #[test]
    fn parse_filters_unknown_column() {
        let json = r#"[
            {"type": "string", "column": "invalid_column", "operator": "=", "value": "test"}
        ]"#;
        let err = parse_filters(json, &traces()).unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownFilterColumn {
                view: "traces".into(),
                column: "invalid_column".into()
            }
        );
    }

    #[test]
    fn parse_filters_too_large() {
        let json = format!("[{}]", " ".repeat(MAX_FILTER_JSON_SIZE));
        assert!(parse_filters(&json, &traces()).is_err());
    }

    #[test]
    fn parse_filters_too_many() {
        let one = r#"{"type": "null", "column": "sessionId", "operator": "is null"}"#;
        let json = format!("[{}]", vec![one; MAX_FILTERS + 1].join(","));
        let err = parse_filters(&json, &traces()).unwrap_err();
        assert!(err.to_string().contains("Maximum 50 filters"));
        let json = format!("[{}]", vec![one; 3].join(","));
        assert!(parse_filters_with_limit(&json, &traces(), 2).is_err());
    }

    #[test]
    fn check_filter_size_counts_embedded_filters() {
        let small = FilterList::new(vec![Filter::String {
            column: "name".into(),
            operator: crate::filters::StringOp::Eq,
            value: "chat".into(),
        }]);
        assert!(check_filter_size(&small).is_ok());

        let large = FilterList::new(vec![Filter::String {
            column: "name".into(),
            operator: crate::filters::StringOp::Eq,
            value: "x".repeat(MAX_FILTER_JSON_SIZE),
        }]);
        let err = check_filter_size(&large).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum size"));
    }
}
