//! Ordered filter collections with AND semantics

use serde::{Deserialize, Serialize};

use super::compile::FilterContext;
use super::types::Filter;
use crate::error::QueryError;
use crate::sql::expr::{Expr, and};
use crate::sql::{RenderedSql, Renderer, SqlDialect};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterList(Vec<Filter>);

impl FilterList {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self(filters)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// AND of every compiled filter; `1 = 1` when empty
    pub fn apply(&self, ctx: &FilterContext<'_>) -> Result<Expr, QueryError> {
        let compiled = self
            .0
            .iter()
            .map(|f| f.compile(ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(and(compiled))
    }

    pub fn find(&self, predicate: impl Fn(&Filter) -> bool) -> Option<&Filter> {
        self.0.iter().find(|f| predicate(f))
    }

    pub fn some(&self, predicate: impl Fn(&Filter) -> bool) -> bool {
        self.0.iter().any(predicate)
    }

    /// Columns read by any filter, in order, with repeats
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().flat_map(Filter::columns)
    }

    pub fn to_fragment(
        &self,
        ctx: &FilterContext<'_>,
        dialect: &dyn SqlDialect,
    ) -> Result<RenderedSql, QueryError> {
        Ok(Renderer::render_expr(dialect, &self.apply(ctx)?))
    }
}

impl From<Vec<Filter>> for FilterList {
    fn from(filters: Vec<Filter>) -> Self {
        Self(filters)
    }
}

impl<'a> IntoIterator for &'a FilterList {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
