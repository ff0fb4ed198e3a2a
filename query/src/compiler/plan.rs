//! Semantic checks and join planning

use std::collections::BTreeSet;

use super::ir::{DeclarativeQuery, TIME_DIMENSION};
use crate::error::QueryError;
use crate::filters::{check_filter_size, check_filters};
use crate::sql::expr::{Expr, TimeGrain};
use crate::views::{Aggregation, DimensionDecl, MeasureDecl, Relation, ViewDeclaration};

pub(crate) struct PlannedDimension<'a> {
    pub name: &'a str,
    pub decl: &'a DimensionDecl,
}

pub(crate) struct PlannedMetric<'a> {
    pub alias: String,
    pub decl: &'a MeasureDecl,
    pub aggregation: Aggregation,
}

impl PlannedMetric<'_> {
    pub fn expr(&self) -> Expr {
        self.aggregation.apply(self.decl.sql.clone())
    }
}

/// A query resolved against its view
pub(crate) struct QueryPlan<'a> {
    pub view: &'a ViewDeclaration,
    pub dimensions: Vec<PlannedDimension<'a>>,
    pub metrics: Vec<PlannedMetric<'a>>,
    pub grain: Option<TimeGrain>,
    /// Optional joins referenced by any selected, filtered or ordered field
    pub relations: BTreeSet<Relation>,
    pub payload_selected: bool,
    pub payload_filtered: bool,
    /// Entity keys pinned by an `any of` filter on the view's key
    pub entity_ids: Option<Vec<String>>,
    /// Ordering as (output column, descending), tie-breaks included
    pub ordering: Vec<(String, bool)>,
}

impl QueryPlan<'_> {
    pub fn selects_entity_key(&self) -> bool {
        self.dimensions.iter().any(|d| d.name == self.view.entity_key)
    }

    pub fn dimension(&self, name: &str) -> Option<&PlannedDimension<'_>> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn metric(&self, alias: &str) -> Option<&PlannedMetric<'_>> {
        self.metrics.iter().find(|m| m.alias == alias)
    }
}

pub(crate) fn plan<'a>(
    view: &'a ViewDeclaration,
    query: &DeclarativeQuery,
    max_filters: usize,
) -> Result<QueryPlan<'a>, QueryError> {
    if query.from_timestamp >= query.to_timestamp {
        return Err(QueryError::InvalidTimeWindow {
            from: query.from_timestamp.to_rfc3339(),
            to: query.to_timestamp.to_rfc3339(),
        });
    }
    if query.limit() == Some(0) {
        return Err(QueryError::InvalidRowLimit {
            reason: "row_limit must be at least 1".into(),
        });
    }
    if query.skip().is_some_and(|o| o > 0) && query.limit().is_none() {
        return Err(QueryError::InvalidRowLimit {
            reason: "offset requires a row_limit".into(),
        });
    }

    let mut relations = BTreeSet::new();

    let mut dimensions: Vec<PlannedDimension<'a>> = Vec::with_capacity(query.dimensions.len());
    for dim in &query.dimensions {
        let (name, decl) = view
            .dimensions
            .get_key_value(dim.field.as_str())
            .ok_or_else(|| QueryError::UnknownDimension {
                view: view.name.to_string(),
                field: dim.field.clone(),
            })?;
        if !decl.value_type.is_groupable() {
            return Err(QueryError::DimensionNotGroupable {
                field: dim.field.clone(),
                value_type: decl.value_type,
            });
        }
        if dimensions.iter().any(|d| d.name == *name) {
            continue;
        }
        relations.extend(decl.requires);
        dimensions.push(PlannedDimension { name, decl });
    }

    let mut metrics: Vec<PlannedMetric<'a>> = Vec::with_capacity(query.metrics.len());
    for metric in &query.metrics {
        let decl = view
            .get_measure(&metric.measure)
            .ok_or_else(|| QueryError::UnknownMeasure {
                view: view.name.to_string(),
                measure: metric.measure.clone(),
            })?;
        if !decl.value_type.permits(metric.aggregation) {
            return Err(QueryError::AggregationNotPermitted {
                measure: metric.measure.clone(),
                aggregation: metric.aggregation,
                value_type: decl.value_type,
            });
        }
        let alias = metric.alias();
        if metrics.iter().any(|m| m.alias == alias) {
            continue;
        }
        relations.extend(decl.requires);
        metrics.push(PlannedMetric {
            alias,
            decl,
            aggregation: metric.aggregation,
        });
    }

    let grain = query
        .time_dimension
        .map(|t| t.granularity.resolve(query.from_timestamp, query.to_timestamp));

    if dimensions.is_empty() && metrics.is_empty() && grain.is_none() {
        return Err(QueryError::EmptySelection);
    }

    check_filter_size(&query.filters)?;
    check_filters(query.filters.iter(), view, max_filters)?;
    for column in query.filters.columns() {
        if let Some(target) = view.column(column) {
            relations.extend(target.requires);
        }
    }
    let payload_filtered = query.filters.some(|f| {
        f.columns()
            .into_iter()
            .any(|c| view.column(c).is_some_and(|t| t.payload))
    });

    let entity_ids = query
        .filters
        .find(|f| f.pinned_values(view.entity_key).is_some())
        .and_then(|f| f.pinned_values(view.entity_key))
        .map(<[String]>::to_vec);

    let mut plan = QueryPlan {
        view,
        payload_selected: dimensions.iter().any(|d| d.decl.payload),
        dimensions,
        metrics,
        grain,
        relations,
        payload_filtered,
        entity_ids,
        ordering: Vec::new(),
    };
    plan.ordering = ordering(&plan, query)?;
    Ok(plan)
}

/// Explicit ordering followed by ascending tie-breaks over the remaining
/// non-payload outputs. Without explicit ordering the time bucket leads.
fn ordering(plan: &QueryPlan<'_>, query: &DeclarativeQuery) -> Result<Vec<(String, bool)>, QueryError> {
    let mut ordering: Vec<(String, bool)> = Vec::new();
    let is_output = |field: &str| {
        plan.dimension(field).is_some()
            || plan.metric(field).is_some()
            || (field == TIME_DIMENSION && plan.grain.is_some())
    };

    for order in query.orderings() {
        if !is_output(&order.field) {
            return Err(QueryError::UnknownOrderField {
                field: order.field.clone(),
            });
        }
        if ordering.iter().any(|(f, _)| *f == order.field) {
            continue;
        }
        let desc = order.direction == super::ir::SortDirection::Desc;
        ordering.push((order.field.clone(), desc));
    }

    let mut push_tie_break = |field: &str| {
        if !ordering.iter().any(|(f, _)| f == field) {
            ordering.push((field.to_string(), false));
        }
    };
    if plan.grain.is_some() {
        push_tie_break(TIME_DIMENSION);
    }
    for dim in plan.dimensions.iter().filter(|d| !d.decl.payload) {
        push_tie_break(dim.name);
    }
    Ok(ordering)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{Granularity, SortDirection};
    use crate::filters::{Filter, OptionsOp, StringOp};
    use crate::views::{SchemaVersion, ValueType, ViewRegistry};
    use chrono::{TimeZone, Utc};

    fn query(view: &str) -> DeclarativeQuery {
        DeclarativeQuery::new(
            view,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
    }

    fn with_plan<T>(
        version: SchemaVersion,
        q: &DeclarativeQuery,
        f: impl FnOnce(Result<QueryPlan<'_>, QueryError>) -> T,
    ) -> T {
        let registry = ViewRegistry::builtin();
        let view = registry.resolve(&q.view, version).unwrap();
        f(plan(view, q, 50))
    }

    #[test]
    fn test_relations_follow_referenced_fields() {
        let q = query("traces").dimension("name").metric("count", Aggregation::Count);
        with_plan(SchemaVersion::V1, &q, |p| assert!(p.unwrap().relations.is_empty()));

        let q = query("traces").metric("totalCost", Aggregation::Sum);
        with_plan(SchemaVersion::V1, &q, |p| {
            assert_eq!(
                p.unwrap().relations.into_iter().collect::<Vec<_>>(),
                vec![Relation::ObservationStats]
            )
        });

        // v2 reads the same measure from the rollup
        with_plan(SchemaVersion::V2, &q, |p| assert!(p.unwrap().relations.is_empty()));

        let q = query("observations")
            .metric("count", Aggregation::Count)
            .filter(Filter::String {
                column: "traceName".into(),
                operator: StringOp::Eq,
                value: "qa".into(),
            });
        with_plan(SchemaVersion::V1, &q, |p| {
            assert!(p.unwrap().relations.contains(&Relation::ParentTrace))
        });
    }

    #[test]
    fn test_unknown_names() {
        let q = query("traces").dimension("bogus");
        with_plan(SchemaVersion::V1, &q, |p| {
            assert!(matches!(p, Err(QueryError::UnknownDimension { .. })))
        });
        let q = query("traces").metric("bogus", Aggregation::Count);
        with_plan(SchemaVersion::V1, &q, |p| {
            assert!(matches!(p, Err(QueryError::UnknownMeasure { .. })))
        });
        let q = query("traces")
            .metric("count", Aggregation::Count)
            .order_by("sum_count", SortDirection::Desc);
        with_plan(SchemaVersion::V1, &q, |p| {
            assert!(matches!(p, Err(QueryError::UnknownOrderField { .. })))
        });
    }

    #[test]
    fn test_aggregation_must_fit_type() {
        let q = query("traces").metric("uniqueUserIds", Aggregation::Sum);
        with_plan(SchemaVersion::V2, &q, |p| match p {
            Err(QueryError::AggregationNotPermitted { value_type, .. }) => {
                assert_eq!(value_type, ValueType::String)
            }
            _ => panic!("expected AggregationNotPermitted"),
        });
    }

    #[test]
    fn test_map_dimensions_not_groupable() {
        let q = query("traces").dimension("tags").metric("count", Aggregation::Count);
        with_plan(SchemaVersion::V1, &q, |p| {
            assert!(matches!(p, Err(QueryError::DimensionNotGroupable { .. })))
        });
    }

    #[test]
    fn test_empty_selection_and_window() {
        with_plan(SchemaVersion::V1, &query("traces"), |p| {
            assert!(matches!(p, Err(QueryError::EmptySelection)))
        });
        let mut q = query("traces").metric("count", Aggregation::Count);
        q.to_timestamp = q.from_timestamp;
        with_plan(SchemaVersion::V1, &q, |p| {
            assert!(matches!(p, Err(QueryError::InvalidTimeWindow { .. })))
        });
        let q = query("traces").metric("count", Aggregation::Count).row_limit(0);
        with_plan(SchemaVersion::V1, &q, |p| {
            assert!(matches!(p, Err(QueryError::InvalidRowLimit { .. })))
        });
    }

    #[test]
    fn test_entity_ids_from_key_filter() {
        let q = query("sessions")
            .metric("count", Aggregation::Count)
            .filter(Filter::StringOptions {
                column: "id".into(),
                operator: OptionsOp::AnyOf,
                value: vec!["s1".into(), "s2".into()],
            });
        with_plan(SchemaVersion::V2, &q, |p| {
            assert_eq!(p.unwrap().entity_ids, Some(vec!["s1".to_string(), "s2".to_string()]))
        });

        let q = query("sessions")
            .metric("count", Aggregation::Count)
            .filter(Filter::StringOptions {
                column: "id".into(),
                operator: OptionsOp::NoneOf,
                value: vec!["s1".into()],
            });
        with_plan(SchemaVersion::V2, &q, |p| assert_eq!(p.unwrap().entity_ids, None));

        let q = query("traces")
            .metric("count", Aggregation::Count)
            .filter(Filter::StringOptions {
                column: "id".into(),
                operator: OptionsOp::AnyOf,
                value: vec![],
            });
        with_plan(SchemaVersion::V2, &q, |p| assert_eq!(p.unwrap().entity_ids, None));
    }

    #[test]
    fn test_oversized_filters_rejected() {
        let q = query("traces")
            .metric("count", Aggregation::Count)
            .filter(Filter::String {
                column: "name".into(),
                operator: StringOp::Contains,
                value: "x".repeat(crate::filters::MAX_FILTER_JSON_SIZE),
            });
        with_plan(SchemaVersion::V1, &q, |p| {
            assert!(matches!(p, Err(QueryError::InvalidFilter { .. })))
        });
    }

    #[test]
    fn test_ordering_tie_breaks() {
        let q = query("traces")
            .dimension("name")
            .dimension("input")
            .time_dimension(Granularity::Hour)
            .metric("count", Aggregation::Count)
            .order_by("count_count", SortDirection::Desc);
        with_plan(SchemaVersion::V1, &q, |p| {
            let p = p.unwrap();
            assert!(p.payload_selected);
            assert_eq!(
                p.ordering,
                vec![
                    ("count_count".to_string(), true),
                    ("time_dimension".to_string(), false),
                    ("name".to_string(), false),
                ]
            );
        });
    }
}
