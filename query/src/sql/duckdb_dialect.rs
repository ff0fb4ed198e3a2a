//! DuckDB SQL dialect implementation

use super::dialect::call;
use super::expr::{AggFunc, PairField, TimeGrain};
use super::SqlDialect;

/// DuckDB SQL dialect
pub struct DuckdbDialect;

impl DuckdbDialect {
    fn with_filter(call_sql: String, filter: Option<&str>) -> String {
        match filter {
            Some(cond) => format!("{} FILTER (WHERE {})", call_sql, cond),
            None => call_sql,
        }
    }
}

impl SqlDialect for DuckdbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn placeholder(&self, _name: &str, _ch_type: &str, index: usize) -> String {
        format!("${}", index)
    }

    fn table_ref(&self, table: &str, alias: &str, _replacing: bool) -> String {
        format!("{} AS {}", table, alias)
    }

    fn time_bucket(&self, expr: &str, grain: TimeGrain) -> String {
        format!("date_trunc('{}', {})", grain.as_str(), expr)
    }

    fn duration_ms(&self, start: &str, end: &str) -> String {
        format!("date_diff('millisecond', {}, {})", start, end)
    }

    fn array_length(&self, array: &str) -> String {
        format!("len({})", array)
    }

    fn array_has_any(&self, array: &str, values: &str) -> String {
        format!("list_has_any({}, {})", array, values)
    }

    fn array_has_all(&self, array: &str, values: &str) -> String {
        format!("list_has_all({}, {})", array, values)
    }

    fn lambda(&self, var: &str, body: &str) -> String {
        format!("lambda {}: {}", var, body)
    }

    fn array_exists(&self, array: &str, lambda: &str) -> String {
        format!("(len(list_filter({}, {})) > 0)", array, lambda)
    }

    fn array_filter(&self, array: &str, lambda: &str) -> String {
        format!("list_filter({}, {})", array, lambda)
    }

    fn array_map(&self, array: &str, lambda: &str) -> String {
        format!("list_transform({}, {})", array, lambda)
    }

    fn pair_field(&self, pair: &str, field: PairField) -> String {
        let name = match field {
            PairField::Label => "label",
            PairField::Value => "value",
        };
        format!("struct_extract({}, '{}')", pair, name)
    }

    fn map_value(&self, map: &str, key: &str) -> String {
        format!("map_extract({}, {})[1]", map, key)
    }

    fn contains_ignore_case(&self, haystack: &str, needle: &str) -> String {
        format!("contains(lower({}), lower({}))", haystack, needle)
    }

    fn like(&self, expr: &str, pattern: &str, negated: bool) -> String {
        let op = if negated { "NOT LIKE" } else { "LIKE" };
        format!("{} {} {} ESCAPE '\\'", expr, op, pattern)
    }

    fn aggregate(
        &self,
        func: &AggFunc,
        args: &[String],
        distinct: bool,
        filter: Option<&str>,
    ) -> String {
        let distinct_kw = if distinct { "DISTINCT " } else { "" };
        match func {
            AggFunc::Count | AggFunc::Sum | AggFunc::Avg | AggFunc::Min | AggFunc::Max => {
                let name = match func {
                    AggFunc::Count => "count",
                    AggFunc::Sum => "sum",
                    AggFunc::Avg => "avg",
                    AggFunc::Min => "min",
                    _ => "max",
                };
                Self::with_filter(
                    format!("{}({}{})", name, distinct_kw, args.join(", ")),
                    filter,
                )
            }
            AggFunc::ArgMin => Self::with_filter(call("arg_min", args), filter),
            AggFunc::ArgMax => Self::with_filter(call("arg_max", args), filter),
            AggFunc::Quantile(level) => Self::with_filter(
                format!("quantile_cont({}, {})", args.join(", "), level),
                filter,
            ),
            AggFunc::Histogram(_) => Self::with_filter(call("histogram", args), filter),
            AggFunc::PairList => {
                let label = args.first().map(String::as_str).unwrap_or("NULL");
                let value = args.get(1).map(String::as_str).unwrap_or("NULL");
                Self::with_filter(
                    format!("list(struct_pack(label := {}, value := {}))", label, value),
                    filter,
                )
            }
            AggFunc::DistinctList => {
                let value = args.join(", ");
                let not_null = format!("{} IS NOT NULL", value);
                let cond = match filter {
                    Some(cond) => format!("{} AND {}", not_null, cond),
                    None => not_null,
                };
                format!("list(DISTINCT {}) FILTER (WHERE {})", value, cond)
            }
            AggFunc::DistinctFlatten => {
                let inner = Self::with_filter(call("list", args), filter);
                format!("list_distinct(flatten({}))", inner)
            }
        }
    }
}
