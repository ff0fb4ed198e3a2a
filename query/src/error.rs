//! Query compilation errors
//!
//! Every failure carries the fields a caller needs to point at the offending
//! part of the query. [`QueryError::kind`] maps variants onto the three
//! categories callers branch on.

use serde::Serialize;
use thiserror::Error;

use crate::views::{Aggregation, SchemaVersion, ValueType};

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The (view, version) pair is not registered
    UnknownView,
    /// The query references unknown names or uses a disallowed aggregation
    InvalidQuery,
    /// The query groups by high-cardinality dimensions without a bound
    QuerySafetyViolation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownView => "unknown_view",
            ErrorKind::InvalidQuery => "invalid_query",
            ErrorKind::QuerySafetyViolation => "query_safety_violation",
        }
    }
}

/// Why a query failed the high-cardinality rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SafetyViolation {
    /// Grouped dimensions flagged high-cardinality
    pub high_cardinality_dimensions: Vec<String>,
    /// Ordered fields that are ascending or not one of the query's metrics
    pub invalid_order_by_fields: Vec<String>,
    pub missing_row_limit: bool,
    /// No descending ORDER BY entry on a metric was given
    pub missing_metric_order: bool,
}

impl std::fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "high-cardinality dimensions [{}] require a row limit and a descending order on a metric",
            self.high_cardinality_dimensions.join(", ")
        )?;
        if self.missing_row_limit {
            write!(f, "; row limit missing")?;
        }
        if self.missing_metric_order {
            write!(f, "; no descending metric order")?;
        }
        if !self.invalid_order_by_fields.is_empty() {
            write!(
                f,
                "; invalid order-by fields [{}]",
                self.invalid_order_by_fields.join(", ")
            )?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum QueryError {
    #[error("Unknown view '{view}' for schema version {version}")]
    UnknownView { view: String, version: SchemaVersion },

    #[error("Unknown dimension '{field}' in view '{view}'")]
    UnknownDimension { view: String, field: String },

    #[error("Unknown measure '{measure}' in view '{view}'")]
    UnknownMeasure { view: String, measure: String },

    #[error("Order-by field '{field}' is not a dimension or metric of the query")]
    UnknownOrderField { field: String },

    #[error("Unknown filter column '{column}' in view '{view}'")]
    UnknownFilterColumn { view: String, column: String },

    #[error(
        "Aggregation '{aggregation}' is not permitted for measure '{measure}' of type {value_type}"
    )]
    AggregationNotPermitted {
        measure: String,
        aggregation: Aggregation,
        value_type: ValueType,
    },

    #[error("Dimension '{field}' of type {value_type} cannot be grouped by")]
    DimensionNotGroupable { field: String, value_type: ValueType },

    #[error("Invalid filter on '{column}': {reason}")]
    InvalidFilter { column: String, reason: String },

    #[error("Invalid time window: from {from} must be before to {to}")]
    InvalidTimeWindow { from: String, to: String },

    #[error("Invalid row limit: {reason}")]
    InvalidRowLimit { reason: String },

    #[error("Query selects no dimensions, time dimension, or metrics")]
    EmptySelection,

    #[error("Query safety violation: {0}")]
    SafetyViolation(SafetyViolation),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::UnknownView { .. } => ErrorKind::UnknownView,
            QueryError::SafetyViolation(_) => ErrorKind::QuerySafetyViolation,
            _ => ErrorKind::InvalidQuery,
        }
    }

    pub fn invalid_filter(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Structured form for API and CLI output
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind().as_str(),
            "message": self.to_string(),
            "details": serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = QueryError::UnknownView {
            view: "spans".into(),
            version: SchemaVersion::V2,
        };
        assert_eq!(err.kind(), ErrorKind::UnknownView);
        assert_eq!(err.to_string(), "Unknown view 'spans' for schema version v2");

        let err = QueryError::UnknownMeasure {
            view: "traces".into(),
            measure: "tokens".into(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);

        let err = QueryError::SafetyViolation(SafetyViolation::default());
        assert_eq!(err.kind(), ErrorKind::QuerySafetyViolation);
    }

    #[test]
    fn test_aggregation_not_permitted_display() {
        let err = QueryError::AggregationNotPermitted {
            measure: "uniqueUserIds".into(),
            aggregation: Aggregation::Sum,
            value_type: ValueType::String,
        };
        assert_eq!(
            err.to_string(),
            "Aggregation 'sum' is not permitted for measure 'uniqueUserIds' of type string"
        );
    }

    #[test]
    fn test_safety_violation_json_is_structured() {
        let err = QueryError::SafetyViolation(SafetyViolation {
            high_cardinality_dimensions: vec!["id".into()],
            invalid_order_by_fields: vec!["name".into()],
            missing_row_limit: true,
            missing_metric_order: true,
        });
        let json = err.to_json();
        assert_eq!(json["kind"], "query_safety_violation");
        assert_eq!(json["details"]["error"], "safety_violation");
        assert_eq!(json["details"]["high_cardinality_dimensions"][0], "id");
        assert_eq!(json["details"]["invalid_order_by_fields"][0], "name");
        assert_eq!(json["details"]["missing_row_limit"], true);
    }

    #[test]
    fn test_invalid_filter_json() {
        let err = QueryError::invalid_filter("tags", "array columns do not support none of");
        let json = err.to_json();
        assert_eq!(json["kind"], "invalid_query");
        assert_eq!(json["details"]["column"], "tags");
    }
}
