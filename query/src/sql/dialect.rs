//! SQL dialect trait for multi-database support
//!
//! The renderer walks the expression tree and hands already rendered pieces to
//! the dialect, which decides how they are spelled.

use super::expr::{AggFunc, PairField, TimeGrain};

/// SQL dialect trait for generating database-specific SQL
///
/// Differences covered:
/// - Parameter placeholders (`{name: Type}` vs `$1`)
/// - Conditional aggregation (`-If` combinators vs `FILTER (WHERE ...)`)
/// - Array and tuple functions, lambdas
/// - Time bucketing
/// - Deduplicating reads of replacing tables
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Placeholder for a parameter.
    ///
    /// `index` is the 1-based position of the parameter's first appearance.
    /// - ClickHouse: `{name: Type}`
    /// - DuckDB: `$index`
    fn placeholder(&self, name: &str, ch_type: &str, index: usize) -> String;

    /// Static string literal
    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Table reference in FROM/JOIN
    ///
    /// - ClickHouse: `traces AS t FINAL` for replacing tables
    /// - DuckDB: `traces AS t`
    fn table_ref(&self, table: &str, alias: &str, replacing: bool) -> String;

    /// Truncate a timestamp to the start of its bucket
    ///
    /// - ClickHouse: `toStartOfInterval(ts, INTERVAL 1 HOUR)`
    /// - DuckDB: `date_trunc('hour', ts)`
    fn time_bucket(&self, expr: &str, grain: TimeGrain) -> String;

    /// Duration in milliseconds between two timestamps
    ///
    /// - ClickHouse: `dateDiff('millisecond', start, end)`
    /// - DuckDB: `date_diff('millisecond', start, end)`
    fn duration_ms(&self, start: &str, end: &str) -> String;

    fn array_length(&self, array: &str) -> String;

    /// True when the array shares at least one element with `values`
    fn array_has_any(&self, array: &str, values: &str) -> String;

    /// True when the array contains every element of `values`
    fn array_has_all(&self, array: &str, values: &str) -> String;

    /// Anonymous function binding `var`
    ///
    /// - ClickHouse: `x -> body`
    /// - DuckDB: `lambda x: body`
    fn lambda(&self, var: &str, body: &str) -> String;

    fn array_exists(&self, array: &str, lambda: &str) -> String;

    fn array_filter(&self, array: &str, lambda: &str) -> String;

    fn array_map(&self, array: &str, lambda: &str) -> String;

    /// Read one side of a `(label, value)` pair built by [`AggFunc::PairList`]
    fn pair_field(&self, pair: &str, field: PairField) -> String;

    /// Value stored under `key` in a map column
    fn map_value(&self, map: &str, key: &str) -> String;

    fn contains_ignore_case(&self, haystack: &str, needle: &str) -> String;

    /// LIKE with backslash as escape character
    fn like(&self, expr: &str, pattern: &str, negated: bool) -> String;

    /// Aggregate call with optional row filter
    fn aggregate(
        &self,
        func: &AggFunc,
        args: &[String],
        distinct: bool,
        filter: Option<&str>,
    ) -> String;

    /// Generate LIMIT/OFFSET clause
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (Some(l), Some(o)) if o > 0 => Some(format!("LIMIT {} OFFSET {}", l, o)),
            (Some(l), _) => Some(format!("LIMIT {}", l)),
            (None, Some(o)) if o > 0 => Some(format!("OFFSET {}", o)),
            (None, _) => None,
        }
    }
}

/// Render a function call from already rendered arguments
pub(crate) fn call(name: &str, args: &[String]) -> String {
    format!("{}({})", name, args.join(", "))
}
