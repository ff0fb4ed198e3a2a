//! Declarative query compiler
//!
//! Turns a [`DeclarativeQuery`] into parameterized SQL for one backend and one
//! schema version:
//!
//! 1. resolve the view and check every referenced name ([`plan`])
//! 2. apply the high-cardinality safety rule
//! 3. assemble the statement, as a single SELECT or as a paged two-phase
//!    query when payload columns are selected ([`split`])
//! 4. render it once for the backend's dialect

mod cache;
mod compiled;
mod ir;
mod plan;
mod select;
mod split;


use std::sync::Arc;

pub use cache::CompiledQueryCache;
pub use compiled::CompiledQuery;
pub use ir::{
    ChartConfig, DeclarativeQuery, DimensionRef, Granularity, MetricRef, OrderBy, SortDirection,
    TIME_DIMENSION, TimeDimension,
};

use crate::error::QueryError;
use crate::filters::MAX_FILTERS;
use crate::scope::ProjectScope;
use crate::sql::{Backend, Renderer};
use crate::validation;
use crate::views::{SchemaVersion, ViewRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Upper bound on filters per query
    pub max_filters: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_filters: MAX_FILTERS,
        }
    }
}

#[derive(Clone)]
pub struct QueryCompiler {
    registry: Arc<ViewRegistry>,
    backend: Backend,
    options: CompilerOptions,
}

impl QueryCompiler {
    pub fn new(registry: Arc<ViewRegistry>, backend: Backend) -> Self {
        Self {
            registry,
            backend,
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> CompilerOptions {
        self.options
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    /// Compile a query for `version`.
    ///
    /// `split` asks for two-phase execution of payload columns; it is applied
    /// only when the query qualifies, see [`CompiledQuery::split_applied`].
    pub fn build(
        &self,
        query: &DeclarativeQuery,
        scope: &ProjectScope,
        version: SchemaVersion,
        split: bool,
    ) -> Result<CompiledQuery, QueryError> {
        let view = self.registry.resolve(&query.view, version)?;
        let plan = plan::plan(view, query, self.options.max_filters)?;
        validation::validate(query, view).map_err(QueryError::SafetyViolation)?;

        let (select, split_applied) = match split::split_blocker(&plan, query, split) {
            None => (split::build_split(&plan, query, &scope.project_id)?, true),
            Some(reason) => {
                if split {
                    tracing::debug!(
                        view = %view.name,
                        version = %version,
                        reason = reason.as_str(),
                        "Split execution not applied"
                    );
                }
                (
                    select::build_select(&plan, query, &scope.project_id, false)?,
                    false,
                )
            }
        };

        let rendered = Renderer::render_select(self.backend.dialect(), &select);
        tracing::debug!(
            view = %view.name,
            version = %version,
            backend = %self.backend,
            params = rendered.params.len(),
            split_applied,
            "Compiled query"
        );

        Ok(CompiledQuery {
            sql: rendered.sql,
            params: rendered.params,
            bind_order: rendered.bind_order,
            view: view.name.to_string(),
            version,
            backend: self.backend,
            columns: select.output_columns(),
            split_applied,
        })
    }
}
