//! ClickHouse SQL dialect implementation

use super::dialect::call;
use super::expr::{AggFunc, PairField, TimeGrain};
use super::SqlDialect;

/// ClickHouse SQL dialect
pub struct ClickhouseDialect;

impl ClickhouseDialect {
    /// Append the `-If` combinator and its condition when a filter is present
    fn combinator(name: &str, mut args: Vec<String>, filter: Option<&str>) -> (String, Vec<String>) {
        match filter {
            Some(cond) => {
                args.push(cond.to_string());
                (format!("{}If", name), args)
            }
            None => (name.to_string(), args),
        }
    }
}

impl SqlDialect for ClickhouseDialect {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn placeholder(&self, name: &str, ch_type: &str, _index: usize) -> String {
        format!("{{{}: {}}}", name, ch_type)
    }

    fn table_ref(&self, table: &str, alias: &str, replacing: bool) -> String {
        if replacing {
            format!("{} AS {} FINAL", table, alias)
        } else {
            format!("{} AS {}", table, alias)
        }
    }

    fn time_bucket(&self, expr: &str, grain: TimeGrain) -> String {
        let unit = match grain {
            TimeGrain::Minute => "MINUTE",
            TimeGrain::Hour => "HOUR",
            TimeGrain::Day => "DAY",
            TimeGrain::Week => "WEEK",
            TimeGrain::Month => "MONTH",
        };
        format!("toStartOfInterval({}, INTERVAL 1 {})", expr, unit)
    }

    fn duration_ms(&self, start: &str, end: &str) -> String {
        format!("dateDiff('millisecond', {}, {})", start, end)
    }

    fn array_length(&self, array: &str) -> String {
        format!("length({})", array)
    }

    fn array_has_any(&self, array: &str, values: &str) -> String {
        format!("hasAny({}, {})", array, values)
    }

    fn array_has_all(&self, array: &str, values: &str) -> String {
        format!("hasAll({}, {})", array, values)
    }

    fn lambda(&self, var: &str, body: &str) -> String {
        format!("{} -> {}", var, body)
    }

    fn array_exists(&self, array: &str, lambda: &str) -> String {
        format!("arrayExists({}, {})", lambda, array)
    }

    fn array_filter(&self, array: &str, lambda: &str) -> String {
        format!("arrayFilter({}, {})", lambda, array)
    }

    fn array_map(&self, array: &str, lambda: &str) -> String {
        format!("arrayMap({}, {})", lambda, array)
    }

    fn pair_field(&self, pair: &str, field: PairField) -> String {
        let index = match field {
            PairField::Label => 1,
            PairField::Value => 2,
        };
        format!("tupleElement({}, {})", pair, index)
    }

    fn map_value(&self, map: &str, key: &str) -> String {
        format!("{}[{}]", map, key)
    }

    fn contains_ignore_case(&self, haystack: &str, needle: &str) -> String {
        format!("positionCaseInsensitive({}, {}) > 0", haystack, needle)
    }

    fn like(&self, expr: &str, pattern: &str, negated: bool) -> String {
        // ClickHouse LIKE treats backslash as the escape character
        let op = if negated { "NOT LIKE" } else { "LIKE" };
        format!("{} {} {}", expr, op, pattern)
    }

    fn aggregate(
        &self,
        func: &AggFunc,
        args: &[String],
        distinct: bool,
        filter: Option<&str>,
    ) -> String {
        let args = args.to_vec();
        match func {
            AggFunc::Count if distinct => {
                let (name, args) = Self::combinator("uniqExact", args, filter);
                call(&name, &args)
            }
            AggFunc::Count => match filter {
                Some(cond) => format!("countIf({})", cond),
                None => call("count", &args),
            },
            AggFunc::Sum | AggFunc::Avg | AggFunc::Min | AggFunc::Max => {
                let base = match func {
                    AggFunc::Sum => "sum",
                    AggFunc::Avg => "avg",
                    AggFunc::Min => "min",
                    _ => "max",
                };
                let (name, args) = Self::combinator(base, args, filter);
                call(&name, &args)
            }
            AggFunc::ArgMin => {
                let (name, args) = Self::combinator("argMin", args, filter);
                call(&name, &args)
            }
            AggFunc::ArgMax => {
                let (name, args) = Self::combinator("argMax", args, filter);
                call(&name, &args)
            }
            AggFunc::Quantile(level) => {
                let (name, args) = Self::combinator("quantile", args, filter);
                format!("{}({})({})", name, level, args.join(", "))
            }
            AggFunc::Histogram(buckets) => {
                let (name, args) = Self::combinator("histogram", args, filter);
                format!("{}({})({})", name, buckets, args.join(", "))
            }
            AggFunc::PairList => {
                let pair = call("tuple", &args);
                let (name, args) = Self::combinator("groupArray", vec![pair], filter);
                call(&name, &args)
            }
            AggFunc::DistinctList => {
                let (name, args) = Self::combinator("groupUniqArray", args, filter);
                call(&name, &args)
            }
            AggFunc::DistinctFlatten => {
                let (name, args) = Self::combinator("groupUniqArrayArray", args, filter);
                call(&name, &args)
            }
        }
    }
}
