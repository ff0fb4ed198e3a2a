//! Pairing v1 and v2 result rows and measuring how far they drift apart

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::policy::{ConsistencyPolicy, DivergenceSource};
use crate::compiler::{DeclarativeQuery, TIME_DIMENSION};
use crate::data::Row;
use crate::error::QueryError;
use crate::views::{SchemaVersion, ViewRegistry};

/// Errors below this are float noise from different summation orders
const FLOAT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDivergence {
    pub key: String,
    pub metric: String,
    pub v1: f64,
    pub v2: f64,
    pub relative_error: f64,
    pub tolerance: f64,
    pub source: DivergenceSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub view: String,
    /// Columns rows were paired on
    pub key_columns: Vec<String>,
    pub v1_rows: usize,
    pub v2_rows: usize,
    pub missing_in_v1: Vec<String>,
    pub missing_in_v2: Vec<String>,
    pub divergences: Vec<MetricDivergence>,
    /// Expected cause of any difference for this grouping
    pub source: DivergenceSource,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_in_v1.is_empty() && self.missing_in_v2.is_empty() && self.divergences.is_empty()
    }
}

/// Compare the answers both layouts gave to the same query
pub fn compare_results(
    query: &DeclarativeQuery,
    registry: &ViewRegistry,
    v1_rows: &[Row],
    v2_rows: &[Row],
    policy: &ConsistencyPolicy,
) -> Result<ConsistencyReport, QueryError> {
    let view = registry.resolve(&query.view, SchemaVersion::V1)?;

    let mut key_columns = Vec::new();
    let mut source = DivergenceSource::TimeWindowBoundary;
    for dim in &query.dimensions {
        let decl = view
            .get_dimension(&dim.field)
            .ok_or_else(|| QueryError::UnknownDimension {
                view: query.view.clone(),
                field: dim.field.clone(),
            })?;
        if decl.payload || key_columns.contains(&dim.field) {
            continue;
        }
        if registry.divergence_source(&query.view, &dim.field)?
            == DivergenceSource::DenormalizedSourceOfTruth
        {
            source = DivergenceSource::DenormalizedSourceOfTruth;
        }
        key_columns.push(dim.field.clone());
    }
    let time_bucketed = query.time_dimension.is_some();
    if time_bucketed {
        key_columns.push(TIME_DIMENSION.to_string());
    }

    let left = index_rows(v1_rows, &key_columns);
    let right = index_rows(v2_rows, &key_columns);

    let missing_in_v1: Vec<String> = right.keys().filter(|k| !left.contains_key(*k)).cloned().collect();
    let missing_in_v2: Vec<String> = left.keys().filter(|k| !right.contains_key(*k)).cloned().collect();

    let mut divergences = Vec::new();
    for (key, a) in &left {
        let Some(b) = right.get(key) else {
            continue;
        };
        for metric in &query.metrics {
            let alias = metric.alias();
            let v1 = metric_value(a.get(&alias));
            let v2 = metric_value(b.get(&alias));
            let relative_error = relative_error(v1, v2);
            let tolerance = policy.tolerance_for(metric.aggregation, time_bucketed);
            if relative_error > tolerance + FLOAT_EPSILON {
                divergences.push(MetricDivergence {
                    key: key.clone(),
                    metric: alias,
                    v1,
                    v2,
                    relative_error,
                    tolerance,
                    source,
                });
            }
        }
    }

    Ok(ConsistencyReport {
        view: query.view.clone(),
        key_columns,
        v1_rows: v1_rows.len(),
        v2_rows: v2_rows.len(),
        missing_in_v1,
        missing_in_v2,
        divergences,
        source,
    })
}

fn index_rows<'a>(rows: &'a [Row], key_columns: &[String]) -> BTreeMap<String, &'a Row> {
    rows.iter()
        .map(|row| {
            let key: Vec<Value> = key_columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect();
            (Value::Array(key).to_string(), row)
        })
        .collect()
}

/// Numeric reading of a metric cell; histograms reduce to their total mass
fn metric_value(value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        // (lower, upper, height) tuples
        Some(Value::Array(buckets)) => buckets
            .iter()
            .map(|bucket| match bucket {
                Value::Array(parts) => metric_value(parts.last()),
                other => metric_value(Some(other)),
            })
            .sum(),
        // bucket -> count map
        Some(Value::Object(buckets)) => buckets.values().map(|v| metric_value(Some(v))).sum(),
    }
}

fn relative_error(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return 0.0;
    }
    (a - b).abs() / scale
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::views::Aggregation;

    fn rows(values: Value) -> Vec<Row> {
        serde_json::from_value(values).unwrap()
    }

    fn by_name() -> DeclarativeQuery {
        DeclarativeQuery::new(
            "traces",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .dimension("name")
        .metric("count", Aggregation::Count)
    }

    #[test]
    fn test_identical_results_are_consistent() {
        let data = rows(json!([
            {"name": "chat", "count_count": 3},
            {"name": "search", "count_count": 1}
        ]));
        let report = compare_results(
            &by_name(),
            &ViewRegistry::builtin(),
            &data,
            &data,
            &ConsistencyPolicy::default(),
        )
        .unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.key_columns, vec!["name"]);
        assert_eq!(report.source, DivergenceSource::TimeWindowBoundary);
    }

    #[test]
    fn test_reports_missing_keys_and_drift() {
        let v1 = rows(json!([
            {"name": "chat", "count_count": 4},
            {"name": "search", "count_count": 1}
        ]));
        let v2 = rows(json!([
            {"name": "chat", "count_count": "3"},
            {"name": "eval", "count_count": 2}
        ]));
        let report = compare_results(
            &by_name(),
            &ViewRegistry::builtin(),
            &v1,
            &v2,
            &ConsistencyPolicy::default(),
        )
        .unwrap();
        assert_eq!(report.missing_in_v1, vec![r#"["eval"]"#]);
        assert_eq!(report.missing_in_v2, vec![r#"["search"]"#]);
        assert_eq!(report.divergences.len(), 1);
        let d = &report.divergences[0];
        assert_eq!(d.metric, "count_count");
        assert_eq!(d.relative_error, 0.25);
        assert_eq!(d.tolerance, 0.0);
    }

    #[test]
    fn test_denormalized_grouping_attributed() {
        let q = DeclarativeQuery::new(
            "observations",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
        .dimension("traceName")
        .metric("count", Aggregation::Count);
        let v1 = rows(json!([{"traceName": "chat", "count_count": 10}]));
        let v2 = rows(json!([{"traceName": "chat", "count_count": 9}]));
        let report = compare_results(
            &q,
            &ViewRegistry::builtin(),
            &v1,
            &v2,
            &ConsistencyPolicy::default(),
        )
        .unwrap();
        assert_eq!(report.source, DivergenceSource::DenormalizedSourceOfTruth);
        assert_eq!(
            report.divergences[0].source,
            DivergenceSource::DenormalizedSourceOfTruth
        );
    }

    #[test]
    fn test_histogram_mass() {
        assert_eq!(metric_value(Some(&json!([[0.0, 1.0, 2.0], [1.0, 2.0, 3.0]]))), 5.0);
        assert_eq!(metric_value(Some(&json!({"0.5": 2, "1.5": 3}))), 5.0);
        assert_eq!(metric_value(None), 0.0);
        assert_eq!(relative_error(0.0, 0.0), 0.0);
    }
}
