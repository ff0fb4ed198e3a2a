//! Filter compilation
//!
//! Every filter compiles to a predicate over the view's physical expressions.
//! Values are always bound as parameters named after the filtered column.

use chrono::{DateTime, Utc};

use super::types::{
    ArrayOp, BooleanOp, Filter, NullOp, NumberOp, OptionsOp, SearchOp, StringOp,
};
use crate::error::QueryError;
use crate::scope::{from_param, project_param};
use crate::sql::expr::{
    Expr, PairField, ScalarFn, and, always_true, coalesce, col, func, param, scalar, string,
};
use crate::sql::params::ParamValue;
use crate::sql::query::{FromItem, OrderItem, Select};
use crate::sql::{Param, RenderedSql, Renderer, SqlDialect};
use crate::utils::sql::{LikeMatch, like_pattern};
use crate::views::{ValueType, ViewDeclaration};

/// What a filter is compiled against
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub view: &'a ViewDeclaration,
    pub project_id: &'a str,
    /// Lower bound for sub-queries a filter builds on its own
    pub lower_bound: Option<DateTime<Utc>>,
}

impl<'a> FilterContext<'a> {
    pub fn new(view: &'a ViewDeclaration, project_id: &'a str) -> Self {
        Self {
            view,
            project_id,
            lower_bound: None,
        }
    }

    pub fn with_lower_bound(mut self, bound: Option<DateTime<Utc>>) -> Self {
        self.lower_bound = bound;
        self
    }
}

const PAIR: &str = "x";
const SIBLINGS: &str = "sib";
const RANKED: &str = "r";

impl Filter {
    /// Check that every column exists and fits this filter kind
    pub fn validate(&self, view: &ViewDeclaration) -> Result<(), QueryError> {
        if let Filter::Search { columns, .. } = self {
            if columns.is_empty() {
                return Err(QueryError::invalid_filter("search", "no columns to search"));
            }
        }
        for column in self.columns() {
            let target = view
                .column(column)
                .ok_or_else(|| QueryError::UnknownFilterColumn {
                    view: view.name.to_string(),
                    column: column.to_string(),
                })?;
            if !self.accepts(target.value_type) {
                return Err(QueryError::invalid_filter(
                    column,
                    format!(
                        "{} filter cannot target a {} column",
                        self.kind(),
                        target.value_type
                    ),
                ));
            }
        }
        if matches!(self, Filter::Position { .. }) && view.ordinal.is_none() {
            return Err(QueryError::invalid_filter(
                self.columns().join(", "),
                format!("view '{}' has no sibling ordering", view.name),
            ));
        }
        Ok(())
    }

    fn accepts(&self, value_type: ValueType) -> bool {
        use ValueType as V;
        match self {
            Filter::Datetime { .. } => value_type == V::Datetime,
            Filter::String { .. } | Filter::StringOptions { .. } | Filter::Search { .. } => {
                value_type == V::String
            }
            Filter::ArrayOptions { .. } => value_type == V::StringArray,
            Filter::Number { .. } => matches!(value_type, V::Integer | V::Decimal),
            Filter::NumberObject { .. } => matches!(value_type, V::NumberMap | V::ScoreNumbers),
            Filter::StringObject { .. } => value_type == V::StringMap,
            Filter::CategoryOptions { .. } => value_type == V::ScoreCategories,
            Filter::Boolean { .. } => value_type == V::Boolean,
            Filter::Null { .. } => matches!(
                value_type,
                V::String | V::Integer | V::Decimal | V::Boolean | V::Datetime
            ),
            Filter::Position { .. } => value_type == V::Ordinal,
        }
    }

    /// Compile to a predicate expression
    pub fn compile(&self, ctx: &FilterContext<'_>) -> Result<Expr, QueryError> {
        self.validate(ctx.view)?;
        let target = |column: &str| -> Result<(Expr, ValueType), QueryError> {
            ctx.view
                .column(column)
                .map(|c| (c.sql.clone(), c.value_type))
                .ok_or_else(|| QueryError::UnknownFilterColumn {
                    view: ctx.view.name.to_string(),
                    column: column.to_string(),
                })
        };

        let expr = match self {
            Filter::Datetime {
                column,
                operator,
                value,
            } => {
                let (sql, _) = target(column)?;
                sql.compare(operator.binary_op(), hinted(column, *value))
            }
            Filter::String {
                column,
                operator,
                value,
            } => {
                let (sql, _) = target(column)?;
                string_predicate(sql, column, *operator, value)
            }
            Filter::StringOptions {
                column,
                operator,
                value,
            } => {
                if value.is_empty() {
                    return Ok(always_true());
                }
                let (sql, _) = target(column)?;
                let negated = *operator == OptionsOp::NoneOf;
                sql.in_list(string_params(column, value), negated)
            }
            Filter::ArrayOptions {
                column,
                operator,
                value,
            } => {
                if value.is_empty() {
                    return Ok(always_true());
                }
                let (sql, _) = target(column)?;
                array_membership(sql, *operator, string_params(column, value))
            }
            Filter::Number {
                column,
                operator,
                value,
            } => {
                let (sql, value_type) = target(column)?;
                sql.compare(
                    operator.binary_op(),
                    param(Param::hint(column.as_str(), number_value(*value, value_type))),
                )
            }
            Filter::NumberObject {
                column,
                key,
                operator,
                value,
            } => {
                let (sql, value_type) = target(column)?;
                let key = hinted(&format!("{}_key", column), key.as_str());
                let value = hinted(column, *value);
                if value_type == ValueType::ScoreNumbers {
                    scalar(ScalarFn::ArrayExists {
                        array: sql,
                        var: PAIR,
                        predicate: and(vec![
                            pair_field(PairField::Label).eq(key),
                            pair_field(PairField::Value).compare(operator.binary_op(), value),
                        ]),
                    })
                } else {
                    scalar(ScalarFn::MapValue { map: sql, key })
                        .compare(operator.binary_op(), value)
                }
            }
            Filter::StringObject {
                column,
                key,
                operator,
                value,
            } => {
                let (sql, _) = target(column)?;
                let entry = scalar(ScalarFn::MapValue {
                    map: sql,
                    key: hinted(&format!("{}_key", column), key.as_str()),
                });
                string_predicate(entry, column, *operator, value)
            }
            Filter::CategoryOptions {
                column,
                key,
                operator,
                value,
            } => {
                if value.is_empty() {
                    return Ok(always_true());
                }
                let (sql, _) = target(column)?;
                let categories = scalar(ScalarFn::ArrayMap {
                    array: scalar(ScalarFn::ArrayFilter {
                        array: sql,
                        var: PAIR,
                        predicate: pair_field(PairField::Label)
                            .eq(hinted(&format!("{}_key", column), key.as_str())),
                    }),
                    var: PAIR,
                    body: pair_field(PairField::Value),
                });
                array_membership(categories, *operator, string_params(column, value))
            }
            Filter::Boolean {
                column,
                operator,
                value,
            } => {
                let (sql, _) = target(column)?;
                let value = hinted(column, *value);
                match operator {
                    BooleanOp::Eq => sql.eq(value),
                    BooleanOp::Ne => sql.not_eq(value),
                }
            }
            Filter::Null { column, operator } => {
                let (sql, _) = target(column)?;
                match operator {
                    NullOp::IsNull => sql.is_null(),
                    NullOp::IsNotNull => sql.is_not_null(),
                }
            }
            Filter::Position {
                column,
                operator,
                value,
                from_end,
            } => {
                let (sql, _) = target(column)?;
                position_predicate(ctx, sql, column, *operator, *value, *from_end)?
            }
            Filter::Search {
                columns,
                operator: SearchOp::Contains,
                value,
            } => {
                if value.is_empty() {
                    return Ok(always_true());
                }
                let mut parts = Vec::with_capacity(columns.len() * 2);
                for column in columns {
                    let (sql, _) = target(column)?;
                    if !parts.is_empty() {
                        parts.push(string(" "));
                    }
                    parts.push(coalesce(sql, string("")));
                }
                let haystack = if parts.len() == 1 {
                    parts.remove(0)
                } else {
                    func("concat", parts)
                };
                scalar(ScalarFn::ContainsIgnoreCase {
                    haystack,
                    needle: hinted("search", value.as_str()),
                })
            }
        };
        Ok(expr)
    }

    /// Compile and render this filter on its own
    pub fn to_fragment(
        &self,
        ctx: &FilterContext<'_>,
        dialect: &dyn SqlDialect,
    ) -> Result<RenderedSql, QueryError> {
        Ok(Renderer::render_expr(dialect, &self.compile(ctx)?))
    }
}

fn hinted(hint: &str, value: impl Into<ParamValue>) -> Expr {
    param(Param::hint(hint, value))
}

fn string_params(column: &str, values: &[String]) -> Vec<Expr> {
    values.iter().map(|v| hinted(column, v.as_str())).collect()
}

/// Bind integral values as integers when the column is integer-typed
fn number_value(value: f64, value_type: ValueType) -> ParamValue {
    if value_type == ValueType::Integer && value.fract() == 0.0 && value.abs() < 9.0e15 {
        ParamValue::Int(value as i64)
    } else {
        ParamValue::Float(value)
    }
}

fn pair_field(field: PairField) -> Expr {
    scalar(ScalarFn::PairField {
        pair: Expr::Var(PAIR),
        field,
    })
}

fn array_membership(array: Expr, operator: ArrayOp, values: Vec<Expr>) -> Expr {
    match operator {
        ArrayOp::AnyOf => scalar(ScalarFn::ArrayHasAny { array, values }),
        ArrayOp::AllOf => scalar(ScalarFn::ArrayHasAll { array, values }),
    }
}

fn string_predicate(sql: Expr, column: &str, operator: StringOp, value: &str) -> Expr {
    match operator {
        StringOp::Eq => sql.eq(hinted(column, value)),
        StringOp::Ne => sql.not_eq(hinted(column, value)),
        StringOp::Contains => sql.like(hinted(column, like_pattern(value, LikeMatch::Contains)), false),
        StringOp::DoesNotContain => {
            sql.like(hinted(column, like_pattern(value, LikeMatch::Contains)), true)
        }
        StringOp::StartsWith => sql.like(hinted(column, like_pattern(value, LikeMatch::Prefix)), false),
        StringOp::EndsWith => sql.like(hinted(column, like_pattern(value, LikeMatch::Suffix)), false),
    }
}

/// `key IN (SELECT key FROM (ranked siblings) WHERE rank <op> value)`
fn position_predicate(
    ctx: &FilterContext<'_>,
    key: Expr,
    column: &str,
    operator: NumberOp,
    value: u32,
    from_end: bool,
) -> Result<Expr, QueryError> {
    let ordinal = ctx.view.ordinal.as_ref().ok_or_else(|| {
        QueryError::invalid_filter(column, format!("view '{}' has no sibling ordering", ctx.view.name))
    })?;

    let order_by = ordinal
        .order_by
        .iter()
        .map(|c| {
            if from_end {
                OrderItem::desc(col(SIBLINGS, c))
            } else {
                OrderItem::asc(col(SIBLINGS, c))
            }
        })
        .collect();

    let mut conditions = vec![col(SIBLINGS, "project_id").eq(project_param(ctx.project_id))];
    if let Some(bound) = ctx.lower_bound {
        conditions.push(col(SIBLINGS, ordinal.time_column).gt_eq(from_param(bound)));
    }

    let ranked = Select::from(FromItem::table(ordinal.table, SIBLINGS, ordinal.replacing))
        .column(col(SIBLINGS, ordinal.key), "entity_key")
        .column(
            Expr::RowNumber {
                partition_by: vec![col(SIBLINGS, ordinal.partition_by)],
                order_by,
            },
            "sibling_rank",
        )
        .filter(and(conditions));

    let picked = Select::from(FromItem::subquery(ranked, RANKED))
        .column_unaliased(col(RANKED, "entity_key"))
        .filter(
            col(RANKED, "sibling_rank")
                .compare(operator.binary_op(), hinted(column, i64::from(value))),
        );

    Ok(key.in_subquery(picked))
}
