//! Two-phase execution for payload columns
//!
//! Large text columns make sorting and grouping expensive. When a query pages
//! over entities, the page is computed without payload columns first and the
//! payload is fetched for the surviving keys only:
//!
//! ```text
//! WITH split_page AS (<query without payload>)
//! SELECT page.*, payload.input FROM split_page AS page
//! LEFT JOIN (<payload by key>) AS payload ON payload.id = page.id
//! ```

use super::ir::{DeclarativeQuery, TIME_DIMENSION};
use super::plan::QueryPlan;
use super::select::build_select;
use crate::error::QueryError;
use crate::scope::{from_param, project_param};
use crate::sql::expr::{bare, col};
use crate::sql::query::{Cte, FromItem, OrderItem, Select};
use crate::views::PayloadDecl;

pub(crate) const PAGE_CTE: &str = "split_page";
const PAGE: &str = "page";
const PAYLOAD: &str = "payload";
const PAYLOAD_SOURCE: &str = "p";
const PAYLOAD_KEY: &str = "id";

/// Why a query runs as a single statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SplitBlocker {
    NotRequested,
    NoPayloadDimensions,
    EntityKeyNotSelected,
    NoRowLimit,
    PayloadOrdered,
    NoPayloadSource,
}

impl SplitBlocker {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitBlocker::NotRequested => "not requested",
            SplitBlocker::NoPayloadDimensions => "no payload dimensions selected",
            SplitBlocker::EntityKeyNotSelected => "entity key not selected",
            SplitBlocker::NoRowLimit => "no row limit",
            SplitBlocker::PayloadOrdered => "payload dimension in order by",
            SplitBlocker::NoPayloadSource => "view has no payload source",
        }
    }
}

pub(crate) fn split_blocker(
    plan: &QueryPlan<'_>,
    query: &DeclarativeQuery,
    requested: bool,
) -> Option<SplitBlocker> {
    if !requested {
        return Some(SplitBlocker::NotRequested);
    }
    if !plan.payload_selected {
        return Some(SplitBlocker::NoPayloadDimensions);
    }
    if !plan.selects_entity_key() {
        return Some(SplitBlocker::EntityKeyNotSelected);
    }
    if query.limit().is_none() {
        return Some(SplitBlocker::NoRowLimit);
    }
    let payload_ordered = query.orderings().iter().any(|o| {
        plan.dimension(&o.field)
            .is_some_and(|d| d.decl.payload)
    });
    if payload_ordered {
        return Some(SplitBlocker::PayloadOrdered);
    }
    if plan.view.payload.is_none() {
        return Some(SplitBlocker::NoPayloadSource);
    }
    None
}

pub(crate) fn build_split(
    plan: &QueryPlan<'_>,
    query: &DeclarativeQuery,
    project_id: &str,
) -> Result<Select, QueryError> {
    let Some(decl) = plan.view.payload.as_ref() else {
        return build_select(plan, query, project_id, false);
    };
    let mut page = build_select(plan, query, project_id, true)?;
    let hoisted = std::mem::take(&mut page.ctes);

    let payload = payload_select(plan, decl, query, project_id);
    let entity_key = plan.view.entity_key;

    let mut outer = Select::from(FromItem::cte(PAGE_CTE, PAGE));
    for cte in hoisted {
        outer = outer.with_cte(cte);
    }
    outer = outer
        .with_cte(Cte {
            name: PAGE_CTE.to_string(),
            query: page,
        })
        .left_join(
            FromItem::subquery(payload, PAYLOAD),
            col(PAYLOAD, PAYLOAD_KEY).eq(col(PAGE, entity_key)),
        );

    for dim in &plan.dimensions {
        let source = if dim.decl.payload { PAYLOAD } else { PAGE };
        outer = outer.column(col(source, dim.name), dim.name);
    }
    if plan.grain.is_some() {
        outer = outer.column(col(PAGE, TIME_DIMENSION), TIME_DIMENSION);
    }
    for metric in &plan.metrics {
        outer = outer.column(col(PAGE, &metric.alias), &metric.alias);
    }
    for (field, desc) in &plan.ordering {
        outer = outer.order_by(OrderItem {
            expr: col(PAGE, field),
            desc: *desc,
        });
    }
    Ok(outer)
}

/// Payload columns for the keys on the page
fn payload_select(
    plan: &QueryPlan<'_>,
    decl: &PayloadDecl,
    query: &DeclarativeQuery,
    project_id: &str,
) -> Select {
    let page_keys = Select::from(FromItem::cte(PAGE_CTE, PAGE_CTE))
        .column_unaliased(bare(plan.view.entity_key));

    let mut select = Select::from(FromItem::table(decl.table, PAYLOAD_SOURCE, decl.replacing))
        .column(col(PAYLOAD_SOURCE, decl.key), PAYLOAD_KEY);
    for dim in plan.dimensions.iter().filter(|d| d.decl.payload) {
        if let Some((_, expr)) = decl.columns.iter().find(|(name, _)| *name == dim.name) {
            select = select.column(expr.clone(), dim.name);
        }
    }
    select = select
        .filter(col(PAYLOAD_SOURCE, "project_id").eq(project_param(project_id)))
        .filter(col(PAYLOAD_SOURCE, decl.time_column).gt_eq(from_param(query.from_timestamp)))
        .filter(col(PAYLOAD_SOURCE, decl.key).in_subquery(page_keys));
    if decl.grouped {
        select = select.group_by(col(PAYLOAD_SOURCE, decl.key));
    }
    select
}
