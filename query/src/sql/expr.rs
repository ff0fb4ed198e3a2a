//! Expression tree for compiled queries
//!
//! Fragments are built as values and rendered once by [`super::Renderer`].
//! Nothing here knows about a concrete dialect; dialect-specific constructs are
//! expressed as [`ScalarFn`] and [`AggFunc`] nodes and spelled out at render time.

use super::params::Param;
use super::query::{OrderItem, Select};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `table.column` or a bare column
    Column { table: Option<String>, name: String },
    /// Trusted static SQL. Never built from caller input.
    Raw(String),
    Literal(Literal),
    Param(Param),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        query: Box<Select>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// Function spelled the same in every supported dialect (`coalesce`, `lower`, `concat`)
    Func { name: &'static str, args: Vec<Expr> },
    /// Array literal `[a, b]`
    Array(Vec<Expr>),
    Scalar(Box<ScalarFn>),
    Agg(Box<Aggregate>),
    RowNumber {
        partition_by: Vec<Expr>,
        order_by: Vec<OrderItem>,
    },
    /// Reference to a lambda variable
    Var(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    /// Static string literal, quoted at render time
    Str(&'static str),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Plus,
    Minus,
    Divide,
}

impl BinaryOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::GtEq => ">=",
            BinaryOp::LtEq => "<=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Divide => "/",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Divide)
    }
}

/// Time bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeGrain {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeGrain {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeGrain::Minute => "minute",
            TimeGrain::Hour => "hour",
            TimeGrain::Day => "day",
            TimeGrain::Week => "week",
            TimeGrain::Month => "month",
        }
    }
}

/// Which half of a `(label, value)` pair to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairField {
    Label,
    Value,
}

/// Scalar constructs whose spelling differs between dialects.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarFn {
    TimeBucket { expr: Expr, grain: TimeGrain },
    DurationMs { start: Expr, end: Expr },
    ArrayLength(Expr),
    ArrayHasAny { array: Expr, values: Vec<Expr> },
    ArrayHasAll { array: Expr, values: Vec<Expr> },
    /// True when `predicate` holds for some element bound to `var`
    ArrayExists {
        array: Expr,
        var: &'static str,
        predicate: Expr,
    },
    ArrayFilter {
        array: Expr,
        var: &'static str,
        predicate: Expr,
    },
    ArrayMap {
        array: Expr,
        var: &'static str,
        body: Expr,
    },
    PairField { pair: Expr, field: PairField },
    MapValue { map: Expr, key: Expr },
    ContainsIgnoreCase { haystack: Expr, needle: Expr },
}

/// Aggregate function kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    ArgMin,
    ArgMax,
    /// Quantile at the given level, e.g. 0.95
    Quantile(f64),
    /// Histogram with the given bucket count
    Histogram(u32),
    /// List of `(label, value)` pairs from two arguments
    PairList,
    /// Distinct non-null values as a list
    DistinctList,
    /// Distinct elements across array values
    DistinctFlatten,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub func: AggFunc,
    pub args: Vec<Expr>,
    pub distinct: bool,
    /// Only rows satisfying this predicate are aggregated
    pub filter: Option<Expr>,
}

// ============================================================================
// Constructors
// ============================================================================

pub fn col(table: &str, name: &str) -> Expr {
    Expr::Column {
        table: Some(table.to_string()),
        name: name.to_string(),
    }
}

pub fn bare(name: &str) -> Expr {
    Expr::Column {
        table: None,
        name: name.to_string(),
    }
}

pub fn raw(sql: impl Into<String>) -> Expr {
    Expr::Raw(sql.into())
}

pub fn int(value: i64) -> Expr {
    Expr::Literal(Literal::Int(value))
}

pub fn string(value: &'static str) -> Expr {
    Expr::Literal(Literal::Str(value))
}

pub fn null() -> Expr {
    Expr::Literal(Literal::Null)
}

pub fn param(param: Param) -> Expr {
    Expr::Param(param)
}

pub fn func(name: &'static str, args: Vec<Expr>) -> Expr {
    Expr::Func { name, args }
}

pub fn coalesce(expr: Expr, fallback: Expr) -> Expr {
    func("coalesce", vec![expr, fallback])
}

pub fn scalar(f: ScalarFn) -> Expr {
    Expr::Scalar(Box::new(f))
}

/// AND of all conditions. Empty input yields `1 = 1`.
pub fn and(conditions: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(conditions.len());
    for c in conditions {
        match c {
            Expr::And(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => always_true(),
        1 => flat.remove(0),
        _ => Expr::And(flat),
    }
}

pub fn or(conditions: Vec<Expr>) -> Expr {
    match conditions.len() {
        0 => always_false(),
        1 => conditions.into_iter().next().unwrap_or_else(always_false),
        _ => Expr::Or(conditions),
    }
}

pub fn always_true() -> Expr {
    raw("1 = 1")
}

pub fn always_false() -> Expr {
    raw("1 = 0")
}

pub fn agg(func: AggFunc, args: Vec<Expr>) -> Expr {
    Expr::Agg(Box::new(Aggregate {
        func,
        args,
        distinct: false,
        filter: None,
    }))
}

pub fn agg_if(func: AggFunc, args: Vec<Expr>, filter: Expr) -> Expr {
    Expr::Agg(Box::new(Aggregate {
        func,
        args,
        distinct: false,
        filter: Some(filter),
    }))
}

pub fn count_distinct(expr: Expr) -> Expr {
    Expr::Agg(Box::new(Aggregate {
        func: AggFunc::Count,
        args: vec![expr],
        distinct: true,
        filter: None,
    }))
}

impl Expr {
    fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn not_eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, right)
    }

    pub fn gt(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn lt(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn gt_eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, right)
    }

    pub fn lt_eq(self, right: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, right)
    }

    pub fn compare(self, op: BinaryOp, right: Expr) -> Expr {
        self.binary(op, right)
    }

    pub fn minus(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Minus, right)
    }

    pub fn divide(self, right: Expr) -> Expr {
        self.binary(BinaryOp::Divide, right)
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, list: Vec<Expr>, negated: bool) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated,
        }
    }

    pub fn in_subquery(self, query: Select) -> Expr {
        Expr::InSubquery {
            expr: Box::new(self),
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn like(self, pattern: Expr, negated: bool) -> Expr {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern),
            negated,
        }
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// True for non-empty strings; NULL compares as not satisfied
    pub fn non_empty_string(self) -> Expr {
        self.not_eq(string(""))
    }

    /// True when this expression is a negated predicate at the top level
    pub fn is_negated(&self) -> bool {
        match self {
            Expr::Not(_) => true,
            Expr::InList { negated, .. }
            | Expr::InSubquery { negated, .. }
            | Expr::Like { negated, .. } => *negated,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_flattens_and_collapses() {
        let a = col("t", "a").eq(int(1));
        let b = col("t", "b").eq(int(2));
        let c = col("t", "c").eq(int(3));
        match and(vec![and(vec![a.clone(), b]), c]) {
            Expr::And(items) => assert_eq!(items.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
        assert_eq!(and(vec![a.clone()]), a);
        assert_eq!(and(vec![]), always_true());
    }

    #[test]
    fn test_is_negated() {
        assert!(col("t", "a").in_list(vec![int(1)], true).is_negated());
        assert!(!col("t", "a").in_list(vec![int(1)], false).is_negated());
        assert!(col("t", "a").eq(int(1)).not().is_negated());
    }
}
