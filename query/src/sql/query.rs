//! SELECT statement model

use super::expr::{Expr, and};

/// A common table expression: `name AS (query)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub query: Select,
}

/// Source of rows in FROM or JOIN.
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    /// Physical table. `replacing` tables are read with the dialect's dedup modifier.
    Table {
        name: String,
        alias: String,
        replacing: bool,
    },
    /// Reference to a CTE declared in the enclosing WITH clause
    Cte { name: String, alias: String },
    Subquery { query: Box<Select>, alias: String },
}

impl FromItem {
    pub fn table(name: &str, alias: &str, replacing: bool) -> Self {
        FromItem::Table {
            name: name.to_string(),
            alias: alias.to_string(),
            replacing,
        }
    }

    pub fn cte(name: &str, alias: &str) -> Self {
        FromItem::Cte {
            name: name.to_string(),
            alias: alias.to_string(),
        }
    }

    pub fn subquery(query: Select, alias: &str) -> Self {
        FromItem::Subquery {
            query: Box::new(query),
            alias: alias.to_string(),
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            FromItem::Table { alias, .. }
            | FromItem::Cte { alias, .. }
            | FromItem::Subquery { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub item: FromItem,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub desc: bool,
}

impl OrderItem {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, desc: false }
    }

    pub fn desc(expr: Expr) -> Self {
        Self { expr, desc: true }
    }
}

/// A SELECT statement with optional WITH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub ctes: Vec<Cte>,
    pub items: Vec<SelectItem>,
    pub from: FromItem,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    pub fn from(item: FromItem) -> Self {
        Self {
            ctes: Vec::new(),
            items: Vec::new(),
            from: item,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Add a CTE unless one with the same name is already declared.
    pub fn with_cte(mut self, cte: Cte) -> Self {
        if !self.ctes.iter().any(|c| c.name == cte.name) {
            self.ctes.push(cte);
        }
        self
    }

    pub fn column(mut self, expr: Expr, alias: &str) -> Self {
        self.items.push(SelectItem {
            expr,
            alias: Some(alias.to_string()),
        });
        self
    }

    pub fn column_unaliased(mut self, expr: Expr) -> Self {
        self.items.push(SelectItem { expr, alias: None });
        self
    }

    pub fn left_join(mut self, item: FromItem, on: Expr) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Left,
            item,
            on,
        });
        self
    }

    pub fn inner_join(mut self, item: FromItem, on: Expr) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Inner,
            item,
            on,
        });
        self
    }

    /// AND a condition into the WHERE clause.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => and(vec![existing, condition]),
            None => condition,
        });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn order_by(mut self, item: OrderItem) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }

    /// Output column names, in select order
    pub fn output_columns(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| match (&item.alias, &item.expr) {
                (Some(alias), _) => Some(alias.clone()),
                (None, Expr::Column { name, .. }) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}
