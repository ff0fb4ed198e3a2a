//! Single-statement SELECT assembly

use super::ir::{DeclarativeQuery, TIME_DIMENSION};
use super::plan::QueryPlan;
use crate::error::QueryError;
use crate::filters::FilterContext;
use crate::rollups::{RollupOptions, RollupScope, build_rollup};
use crate::scope::{from_param, project_param, to_param};
use crate::sql::expr::{Expr, ScalarFn, scalar};
use crate::sql::query::{FromItem, OrderItem, Select};
use crate::views::{RelationDecl, SchemaVersion, Source};

/// Time bucket over the view's time column
pub(crate) fn bucket(plan: &QueryPlan<'_>) -> Option<Expr> {
    plan.grain.map(|grain| {
        scalar(ScalarFn::TimeBucket {
            expr: plan.view.time_column.clone(),
            grain,
        })
    })
}

/// Expression behind an output column of the plan
fn output_expr(plan: &QueryPlan<'_>, field: &str) -> Option<Expr> {
    if field == TIME_DIMENSION {
        return bucket(plan);
    }
    if let Some(dim) = plan.dimension(field) {
        return Some(dim.decl.sql.clone());
    }
    plan.metric(field).map(|m| m.expr())
}

/// Build the whole query as one statement.
///
/// With `skip_payload` the payload dimensions are left out of every clause;
/// split mode fetches them afterwards.
pub(crate) fn build_select(
    plan: &QueryPlan<'_>,
    query: &DeclarativeQuery,
    project_id: &str,
    skip_payload: bool,
) -> Result<Select, QueryError> {
    let view = plan.view;
    let bounded = RollupScope::new(project_id).with_lower_bound(Some(query.from_timestamp));

    let mut select = match &view.source {
        Source::Table { name, replacing } => {
            Select::from(FromItem::table(name, view.alias, *replacing))
        }
        Source::Rollup(kind) => {
            let options = RollupOptions {
                include_payload: (plan.payload_selected && !skip_payload) || plan.payload_filtered,
            };
            let scope = bounded.clone().with_entity_ids(plan.entity_ids.clone());
            build_rollup(*kind, view.version, &scope, &options)
                .into_iter()
                .fold(
                    Select::from(FromItem::cte(kind.cte_name(), view.alias)),
                    |select, cte| select.with_cte(cte.into_cte()),
                )
        }
    };

    for relation in &plan.relations {
        let Some(decl) = view.get_relation(*relation) else {
            continue;
        };
        select = join_relation(select, decl, view.version, &bounded, plan.entity_ids.as_ref());
    }

    for dim in &plan.dimensions {
        if skip_payload && dim.decl.payload {
            continue;
        }
        select = select.column(dim.decl.sql.clone(), dim.name);
    }
    if let Some(bucket) = bucket(plan) {
        select = select.column(bucket, TIME_DIMENSION);
    }
    for metric in &plan.metrics {
        select = select.column(metric.expr(), &metric.alias);
    }

    select = select
        .filter(view.project_column.clone().eq(project_param(project_id)));
    if let Some(predicate) = &view.base_predicate {
        select = select.filter(predicate.clone());
    }
    select = select
        .filter(view.time_column.clone().gt_eq(from_param(query.from_timestamp)))
        .filter(view.time_column.clone().lt(to_param(query.to_timestamp)));
    if !query.filters.is_empty() {
        let ctx = FilterContext::new(view, project_id).with_lower_bound(Some(query.from_timestamp));
        select = select.filter(query.filters.apply(&ctx)?);
    }

    for dim in &plan.dimensions {
        if skip_payload && dim.decl.payload {
            continue;
        }
        select = select.group_by(dim.decl.sql.clone());
    }
    if let Some(bucket) = bucket(plan) {
        select = select.group_by(bucket);
    }

    for (field, desc) in &plan.ordering {
        if let Some(expr) = output_expr(plan, field) {
            select = select.order_by(OrderItem { expr, desc: *desc });
        }
    }

    Ok(select.limit(query.limit()).offset(query.skip()))
}

/// LEFT JOIN an optional relation. Rollups keyed by the view's own entity
/// share its lower bound and allow-list; other rollups are read unbounded.
fn join_relation(
    select: Select,
    decl: &RelationDecl,
    version: SchemaVersion,
    bounded: &RollupScope,
    entity_ids: Option<&Vec<String>>,
) -> Select {
    match &decl.source {
        Source::Table { name, replacing } => {
            select.left_join(FromItem::table(name, decl.alias, *replacing), decl.on.clone())
        }
        Source::Rollup(kind) => {
            let scope = if decl.entity_keyed {
                bounded.clone().with_entity_ids(entity_ids.cloned())
            } else {
                RollupScope::new(bounded.project_id.clone())
            };
            build_rollup(*kind, version, &scope, &RollupOptions::default())
                .into_iter()
                .fold(select, |select, cte| select.with_cte(cte.into_cte()))
                .left_join(FromItem::cte(kind.cte_name(), decl.alias), decl.on.clone())
        }
    }
}
