//! Single rendering step from expression trees to SQL text
//!
//! Parameters are first written as private markers and resolved to dialect
//! placeholders once the whole statement is assembled, so positional dialects
//! bind in the order placeholders appear in the final text.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::dialect::call;
use super::expr::{Aggregate, Expr, Literal, ScalarFn};
use super::params::{ParamCollector, ParamValue};
use super::query::{FromItem, JoinKind, OrderItem, Select};
use super::SqlDialect;

const MARK_START: char = '\u{1}';
const MARK_END: char = '\u{2}';

/// Rendered SQL with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedSql {
    pub sql: String,
    pub params: BTreeMap<String, ParamValue>,
    /// Distinct parameter names in order of first appearance
    pub bind_order: Vec<String>,
}

pub struct Renderer<'a> {
    dialect: &'a dyn SqlDialect,
    params: ParamCollector,
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: &'a dyn SqlDialect) -> Self {
        Self {
            dialect,
            params: ParamCollector::new(),
        }
    }

    /// Render a full statement
    pub fn render_select(dialect: &'a dyn SqlDialect, query: &Select) -> RenderedSql {
        let mut renderer = Self::new(dialect);
        let text = renderer.select(query);
        renderer.finish(text)
    }

    /// Render a standalone fragment (used to test filters in isolation)
    pub fn render_expr(dialect: &'a dyn SqlDialect, expr: &Expr) -> RenderedSql {
        let mut renderer = Self::new(dialect);
        let text = renderer.expr(expr);
        renderer.finish(text)
    }

    fn finish(self, text: String) -> RenderedSql {
        let params = self.params.into_values();
        let mut indexes: HashMap<String, usize> = HashMap::new();
        let mut bind_order = Vec::new();
        let mut sql = String::with_capacity(text.len());
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            if c != MARK_START {
                sql.push(c);
                continue;
            }
            let name: String = chars.by_ref().take_while(|c| *c != MARK_END).collect();
            let index = match indexes.get(&name) {
                Some(i) => *i,
                None => {
                    bind_order.push(name.clone());
                    let i = bind_order.len();
                    indexes.insert(name.clone(), i);
                    i
                }
            };
            let ch_type = params
                .get(&name)
                .map(ParamValue::clickhouse_type)
                .unwrap_or("String");
            sql.push_str(&self.dialect.placeholder(&name, ch_type, index));
        }

        RenderedSql {
            sql,
            params,
            bind_order,
        }
    }

    fn select(&mut self, q: &Select) -> String {
        let mut parts = Vec::new();

        if !q.ctes.is_empty() {
            let ctes: Vec<String> = q
                .ctes
                .iter()
                .map(|cte| format!("{} AS (\n{}\n)", cte.name, self.select(&cte.query)))
                .collect();
            parts.push(format!("WITH {}", ctes.join(",\n")));
        }

        let items: Vec<String> = q
            .items
            .iter()
            .map(|item| {
                let expr = self.expr(&item.expr);
                match &item.alias {
                    Some(alias) => format!("{} AS {}", expr, alias),
                    None => expr,
                }
            })
            .collect();
        parts.push(format!("SELECT {}", items.join(", ")));
        parts.push(format!("FROM {}", self.from_item(&q.from)));

        for join in &q.joins {
            let kind = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            let item = self.from_item(&join.item);
            let on = self.expr(&join.on);
            parts.push(format!("{} {} ON {}", kind, item, on));
        }

        if let Some(cond) = &q.where_clause {
            parts.push(format!("WHERE {}", self.expr(cond)));
        }

        if !q.group_by.is_empty() {
            let keys: Vec<String> = q.group_by.iter().map(|e| self.expr(e)).collect();
            parts.push(format!("GROUP BY {}", keys.join(", ")));
        }

        if let Some(cond) = &q.having {
            parts.push(format!("HAVING {}", self.expr(cond)));
        }

        if !q.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_items(&q.order_by)));
        }

        if let Some(clause) = self.dialect.limit_offset(q.limit, q.offset) {
            parts.push(clause);
        }

        parts.join("\n")
    }

    fn from_item(&mut self, item: &FromItem) -> String {
        match item {
            FromItem::Table {
                name,
                alias,
                replacing,
            } => self.dialect.table_ref(name, alias, *replacing),
            FromItem::Cte { name, alias } if name == alias => name.clone(),
            FromItem::Cte { name, alias } => format!("{} AS {}", name, alias),
            FromItem::Subquery { query, alias } => {
                format!("(\n{}\n) AS {}", self.select(query), alias)
            }
        }
    }

    fn order_items(&mut self, items: &[OrderItem]) -> String {
        items
            .iter()
            .map(|item| {
                let dir = if item.desc { "DESC" } else { "ASC" };
                format!("{} {}", self.expr(&item.expr), dir)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Vec<String> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    pub fn expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Column { table, name } => match table {
                Some(t) => format!("{}.{}", t, name),
                None => name.clone(),
            },
            Expr::Raw(sql) => sql.clone(),
            Expr::Literal(lit) => match lit {
                Literal::Int(i) => i.to_string(),
                Literal::Float(f) => f.to_string(),
                Literal::Str(s) => self.dialect.string_literal(s),
                Literal::Bool(b) => b.to_string(),
                Literal::Null => "NULL".to_string(),
            },
            Expr::Param(param) => {
                let name = self.params.register(param);
                format!("{}{}{}", MARK_START, name, MARK_END)
            }
            Expr::Binary { left, op, right } => {
                let l = self.expr(left);
                let r = self.expr(right);
                if op.is_arithmetic() {
                    format!("({} {} {})", l, op.as_sql(), r)
                } else {
                    format!("{} {} {}", l, op.as_sql(), r)
                }
            }
            Expr::And(items) => items
                .iter()
                .map(|e| self.expr(e))
                .collect::<Vec<_>>()
                .join(" AND "),
            Expr::Or(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|e| match e {
                        Expr::And(_) => format!("({})", self.expr(e)),
                        _ => self.expr(e),
                    })
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            Expr::Not(inner) => format!("NOT ({})", self.expr(inner)),
            Expr::IsNull { expr, negated } => {
                let e = self.expr(expr);
                if *negated {
                    format!("{} IS NOT NULL", e)
                } else {
                    format!("{} IS NULL", e)
                }
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let e = self.expr(expr);
                let values = self.exprs(list);
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", e, op, values.join(", "))
            }
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => {
                let e = self.expr(expr);
                let sub = self.select(query);
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} (\n{}\n)", e, op, sub)
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let e = self.expr(expr);
                let p = self.expr(pattern);
                self.dialect.like(&e, &p, *negated)
            }
            Expr::Func { name, args } => {
                let args = self.exprs(args);
                call(name, &args)
            }
            Expr::Array(items) => format!("[{}]", self.exprs(items).join(", ")),
            Expr::Scalar(f) => self.scalar(f),
            Expr::Agg(a) => self.aggregate(a),
            Expr::RowNumber {
                partition_by,
                order_by,
            } => {
                let mut window = Vec::new();
                if !partition_by.is_empty() {
                    window.push(format!("PARTITION BY {}", self.exprs(partition_by).join(", ")));
                }
                if !order_by.is_empty() {
                    window.push(format!("ORDER BY {}", self.order_items(order_by)));
                }
                format!("row_number() OVER ({})", window.join(" "))
            }
            Expr::Var(name) => (*name).to_string(),
        }
    }

    fn aggregate(&mut self, agg: &Aggregate) -> String {
        let args = self.exprs(&agg.args);
        let filter = agg.filter.as_ref().map(|f| self.expr(f));
        self.dialect
            .aggregate(&agg.func, &args, agg.distinct, filter.as_deref())
    }

    fn scalar(&mut self, f: &ScalarFn) -> String {
        let d = self.dialect;
        match f {
            ScalarFn::TimeBucket { expr, grain } => {
                let e = self.expr(expr);
                d.time_bucket(&e, *grain)
            }
            ScalarFn::DurationMs { start, end } => {
                let s = self.expr(start);
                let e = self.expr(end);
                d.duration_ms(&s, &e)
            }
            ScalarFn::ArrayLength(array) => {
                let a = self.expr(array);
                d.array_length(&a)
            }
            ScalarFn::ArrayHasAny { array, values } => {
                let a = self.expr(array);
                let v = format!("[{}]", self.exprs(values).join(", "));
                d.array_has_any(&a, &v)
            }
            ScalarFn::ArrayHasAll { array, values } => {
                let a = self.expr(array);
                let v = format!("[{}]", self.exprs(values).join(", "));
                d.array_has_all(&a, &v)
            }
            ScalarFn::ArrayExists {
                array,
                var,
                predicate,
            } => {
                let a = self.expr(array);
                let body = self.expr(predicate);
                d.array_exists(&a, &d.lambda(var, &body))
            }
            ScalarFn::ArrayFilter {
                array,
                var,
                predicate,
            } => {
                let a = self.expr(array);
                let body = self.expr(predicate);
                d.array_filter(&a, &d.lambda(var, &body))
            }
            ScalarFn::ArrayMap { array, var, body } => {
                let a = self.expr(array);
                let b = self.expr(body);
                d.array_map(&a, &d.lambda(var, &b))
            }
            ScalarFn::PairField { pair, field } => {
                let p = self.expr(pair);
                d.pair_field(&p, *field)
            }
            ScalarFn::MapValue { map, key } => {
                let m = self.expr(map);
                let k = self.expr(key);
                d.map_value(&m, &k)
            }
            ScalarFn::ContainsIgnoreCase { haystack, needle } => {
                let h = self.expr(haystack);
                let n = self.expr(needle);
                d.contains_ignore_case(&h, &n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::{AggFunc, agg_if, and, col, int, param, string};
    use crate::sql::params::Param;
    use crate::sql::query::Cte;
    use crate::sql::{ClickhouseDialect, DuckdbDialect};

    fn scoped_select() -> Select {
        Select::from(FromItem::table("traces", "t", true))
            .column(col("t", "name"), "name")
            .filter(col("t", "project_id").eq(param(Param::fixed("projectId", "p1"))))
            .filter(col("t", "name").eq(param(Param::hint("name", "chat"))))
            .filter(col("t", "project_id").eq(param(Param::fixed("projectId", "p1"))))
    }

    #[test]
    fn test_clickhouse_named_placeholders() {
        let rendered = Renderer::render_select(&ClickhouseDialect, &scoped_select());
        assert_eq!(
            rendered.sql,
            "SELECT t.name AS name\nFROM traces AS t FINAL\nWHERE t.project_id = {projectId: String} \
             AND t.name = {name_0: String} AND t.project_id = {projectId: String}"
        );
        assert_eq!(rendered.params.len(), 2);
        assert_eq!(rendered.bind_order, vec!["projectId", "name_0"]);
    }

    #[test]
    fn test_duckdb_numbered_placeholders_reuse_index() {
        let rendered = Renderer::render_select(&DuckdbDialect, &scoped_select());
        assert_eq!(
            rendered.sql,
            "SELECT t.name AS name\nFROM traces AS t\nWHERE t.project_id = $1 AND t.name = $2 AND t.project_id = $1"
        );
    }

    #[test]
    fn test_bind_order_follows_text_not_render_order() {
        // The filter argument is rendered after the value but placed before it
        // in ClickHouse; DuckDB places it last. Both must bind by appearance.
        let expr = agg_if(
            AggFunc::Sum,
            vec![param(Param::hint("v", 1i64))],
            col("t", "x").eq(param(Param::hint("c", 2i64))),
        );
        let rendered = Renderer::render_expr(&ClickhouseDialect, &expr);
        assert_eq!(rendered.sql, "sumIf({v_0: Int64}, t.x = {c_1: Int64})");
        assert_eq!(rendered.bind_order, vec!["v_0", "c_1"]);
    }

    #[test]
    fn test_with_clause_and_limit() {
        let inner = Select::from(FromItem::table("events", "e", false))
            .column(col("e", "trace_id"), "id");
        let q = Select::from(FromItem::cte("rollup", "r"))
            .with_cte(Cte {
                name: "rollup".into(),
                query: inner,
            })
            .column(col("r", "id"), "id")
            .limit(Some(10))
            .offset(Some(20));
        let rendered = Renderer::render_select(&ClickhouseDialect, &q);
        assert_eq!(
            rendered.sql,
            "WITH rollup AS (\nSELECT e.trace_id AS id\nFROM events AS e\n)\nSELECT r.id AS id\nFROM rollup AS r\nLIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_empty_in_list() {
        let rendered = Renderer::render_expr(&ClickhouseDialect, &col("t", "a").in_list(vec![], false));
        assert_eq!(rendered.sql, "1 = 0");
        let rendered = Renderer::render_expr(&ClickhouseDialect, &col("t", "a").in_list(vec![], true));
        assert_eq!(rendered.sql, "1 = 1");
    }

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let e = and(vec![
            col("t", "a").eq(int(1)),
            crate::sql::expr::or(vec![col("t", "b").eq(string("x")), col("t", "c").eq(int(2))]),
        ]);
        let rendered = Renderer::render_expr(&DuckdbDialect, &e);
        assert_eq!(rendered.sql, "t.a = 1 AND (t.b = 'x' OR t.c = 2)");
    }
}
