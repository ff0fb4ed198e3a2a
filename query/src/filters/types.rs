//! Filter type definitions
//!
//! One variant per filter kind, each with its own operator enum so that an
//! operator can only be attached to a kind that supports it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sql::expr::BinaryOp;

/// Filter types for declarative queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Datetime {
        column: String,
        operator: DatetimeOp,
        value: DateTime<Utc>,
    },
    String {
        column: String,
        operator: StringOp,
        value: String,
    },
    /// Membership of a single-valued column
    StringOptions {
        column: String,
        operator: OptionsOp,
        value: Vec<String>,
    },
    /// Membership over an array column
    ArrayOptions {
        column: String,
        operator: ArrayOp,
        value: Vec<String>,
    },
    Number {
        column: String,
        operator: NumberOp,
        value: f64,
    },
    /// Number stored under `key` of a map, or the value of the `key` pair of a
    /// score list
    NumberObject {
        column: String,
        key: String,
        operator: NumberOp,
        value: f64,
    },
    StringObject {
        column: String,
        key: String,
        operator: StringOp,
        value: String,
    },
    /// Categories recorded under `key` of a score list
    CategoryOptions {
        column: String,
        key: String,
        operator: ArrayOp,
        value: Vec<String>,
    },
    Boolean {
        column: String,
        operator: BooleanOp,
        value: bool,
    },
    Null {
        column: String,
        operator: NullOp,
    },
    /// 1-based rank among siblings
    Position {
        column: String,
        operator: NumberOp,
        value: u32,
        #[serde(default)]
        from_end: bool,
    },
    /// Case-insensitive substring over one or more text columns
    Search {
        columns: Vec<String>,
        operator: SearchOp,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatetimeOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "does not contain")]
    DoesNotContain,
    #[serde(rename = "starts with", alias = "starts_with")]
    StartsWith,
    #[serde(rename = "ends with", alias = "ends_with")]
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionsOp {
    #[serde(rename = "any of")]
    AnyOf,
    #[serde(rename = "none of")]
    NoneOf,
}

/// Array membership. Has no `none of` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrayOp {
    #[serde(rename = "any of")]
    AnyOf,
    #[serde(rename = "all of")]
    AllOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullOp {
    #[serde(rename = "is null")]
    IsNull,
    #[serde(rename = "is not null")]
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchOp {
    #[serde(rename = "contains")]
    Contains,
}

impl DatetimeOp {
    pub fn binary_op(&self) -> BinaryOp {
        match self {
            DatetimeOp::Gt => BinaryOp::Gt,
            DatetimeOp::Lt => BinaryOp::Lt,
            DatetimeOp::Gte => BinaryOp::GtEq,
            DatetimeOp::Lte => BinaryOp::LtEq,
        }
    }
}

impl NumberOp {
    pub fn binary_op(&self) -> BinaryOp {
        match self {
            NumberOp::Eq => BinaryOp::Eq,
            NumberOp::Ne => BinaryOp::NotEq,
            NumberOp::Gt => BinaryOp::Gt,
            NumberOp::Lt => BinaryOp::Lt,
            NumberOp::Gte => BinaryOp::GtEq,
            NumberOp::Lte => BinaryOp::LtEq,
        }
    }
}

impl Filter {
    /// Columns this filter reads
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Datetime { column, .. }
            | Self::String { column, .. }
            | Self::StringOptions { column, .. }
            | Self::ArrayOptions { column, .. }
            | Self::Number { column, .. }
            | Self::NumberObject { column, .. }
            | Self::StringObject { column, .. }
            | Self::CategoryOptions { column, .. }
            | Self::Boolean { column, .. }
            | Self::Null { column, .. }
            | Self::Position { column, .. } => vec![column.as_str()],
            Self::Search { columns, .. } => columns.iter().map(String::as_str).collect(),
        }
    }

    /// Filter kind as it appears in the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Datetime { .. } => "datetime",
            Self::String { .. } => "string",
            Self::StringOptions { .. } => "string_options",
            Self::ArrayOptions { .. } => "array_options",
            Self::Number { .. } => "number",
            Self::NumberObject { .. } => "number_object",
            Self::StringObject { .. } => "string_object",
            Self::CategoryOptions { .. } => "category_options",
            Self::Boolean { .. } => "boolean",
            Self::Null { .. } => "null",
            Self::Position { .. } => "position",
            Self::Search { .. } => "search",
        }
    }

    /// Values pinned by an `any of` on `column`, if this filter is one.
    /// An empty list pins nothing; it compiles to an always-true predicate.
    pub fn pinned_values(&self, column: &str) -> Option<&[String]> {
        match self {
            Self::StringOptions {
                column: c,
                operator: OptionsOp::AnyOf,
                value,
            } if c == column && !value.is_empty() => Some(value),
            _ => None,
        }
    }
}
