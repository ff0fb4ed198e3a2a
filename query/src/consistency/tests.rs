//! Dual-version scenarios executed on an in-memory DuckDB seeded with the same
//! data in both layouts.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::*;
use crate::compiler::{DeclarativeQuery, QueryCompiler, SortDirection};
use crate::data::{DuckdbExecutor, ExecuteOptions, QueryExecutor, Row};
use crate::filters::{Filter, NumberOp, OptionsOp};
use crate::scope::ProjectScope;
use crate::sql::Backend;
use crate::views::{Aggregation, SchemaVersion, ViewRegistry};

const TRACES: usize = 20;
const NAMES: [&str; 6] = ["chat", "search", "summarize", "classify", "extract", "rerank"];

fn from() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn to() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn ts(t: DateTime<Utc>) -> String {
    format!("TIMESTAMP '{}'", t.format("%Y-%m-%d %H:%M:%S"))
}

/// One trace with a root generation and a child span, written to both layouts
fn trace_rows(project: &str, id: &str, name: &str, start: DateTime<Utc>) -> String {
    let root = format!("{id}-o1");
    let child = format!("{id}-o2");
    let child_start = start + Duration::seconds(1);
    let end = start + Duration::seconds(3);
    format!(
        "INSERT INTO traces (project_id, id, timestamp, name, environment, input, output) VALUES \
            ('{project}', '{id}', {start}, '{name}', 'prod', 'in-{id}', 'out-{id}');
         INSERT INTO observations (project_id, id, trace_id, parent_observation_id, type, name, start_time, end_time, usage_details, total_cost, input, output) VALUES \
            ('{project}', '{root}', '{id}', NULL, 'GENERATION', 'llm', {start}, {end}, MAP {{'input': 10, 'output': 5, 'total': 15}}, 0.5, 'in-{id}', 'out-{id}'), \
            ('{project}', '{child}', '{id}', '{root}', 'SPAN', 'tool', {child_start}, {end}, NULL, NULL, 'child', 'child');
         INSERT INTO events (project_id, trace_id, span_id, parent_span_id, type, name, environment, start_time, end_time, usage_details, total_cost, input, output, trace_name) VALUES \
            ('{project}', '{id}', '{root}', NULL, 'GENERATION', 'llm', 'prod', {start}, {end}, MAP {{'input': 10, 'output': 5, 'total': 15}}, 0.5, 'in-{id}', 'out-{id}', '{name}'), \
            ('{project}', '{id}', '{child}', '{root}', 'SPAN', 'tool', 'prod', {child_start}, {end}, NULL, NULL, 'child', 'child', '{name}');\n",
        start = ts(start),
        end = ts(end),
        child_start = ts(child_start),
    )
}

/// 20 traces with 6 names in p1, plus rows another project and an earlier
/// window must never see
fn seeded() -> Arc<DuckdbExecutor> {
    let executor = DuckdbExecutor::in_memory().unwrap();
    let mut sql = String::new();
    for i in 0..TRACES {
        let start = from() + Duration::minutes(10 * i as i64 + 5);
        sql.push_str(&trace_rows("p1", &format!("t{i:02}"), NAMES[i % NAMES.len()], start));
    }
    sql.push_str(&trace_rows("p2", "other", "chat", from() + Duration::hours(1)));
    sql.push_str(&trace_rows("p1", "early", "chat", from() - Duration::hours(2)));
    executor.execute_batch(&sql).unwrap();
    Arc::new(executor)
}

fn compiler() -> QueryCompiler {
    QueryCompiler::new(Arc::new(ViewRegistry::builtin()), Backend::Duckdb)
}

fn query(view: &str) -> DeclarativeQuery {
    DeclarativeQuery::new(view, from(), to())
}

async fn run(
    executor: &DuckdbExecutor,
    q: &DeclarativeQuery,
    version: SchemaVersion,
    split: bool,
) -> Vec<Row> {
    let compiled = compiler()
        .build(q, &ProjectScope::new("p1"), version, split)
        .unwrap();
    assert_eq!(compiled.split_applied, split);
    executor
        .execute(&compiled, &ExecuteOptions::default())
        .await
        .unwrap()
}

fn count(rows: &[Row]) -> i64 {
    rows.iter()
        .map(|r| r["count_count"].as_i64().unwrap())
        .sum()
}

#[tokio::test]
async fn test_total_count_equal_across_versions() {
    let executor = seeded();
    let q = query("traces").metric("count", Aggregation::Count);
    for version in [SchemaVersion::V1, SchemaVersion::V2] {
        let rows = run(&executor, &q, version, false).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(count(&rows), TRACES as i64);
    }
}

#[tokio::test]
async fn test_group_by_name_matches() {
    let executor = seeded();
    let q = query("traces")
        .dimension("name")
        .metric("count", Aggregation::Count);
    let v1 = run(&executor, &q, SchemaVersion::V1, false).await;
    let v2 = run(&executor, &q, SchemaVersion::V2, false).await;

    assert_eq!(v1.len(), NAMES.len());
    assert_eq!(count(&v1), TRACES as i64);
    assert_eq!(v1, v2);

    let report = compare_results(
        &q,
        &ViewRegistry::builtin(),
        &v1,
        &v2,
        &ConsistencyPolicy::default(),
    )
    .unwrap();
    assert!(report.is_consistent());
}

#[tokio::test]
async fn test_checker_agrees_on_joined_measures() {
    let executor = seeded();
    let checker = ConsistencyChecker::new(compiler(), executor, ConsistencyPolicy::default());
    let q = query("traces")
        .dimension("environment")
        .metric("count", Aggregation::Count)
        .metric("totalCost", Aggregation::Sum)
        .metric("observationsCount", Aggregation::Sum);
    let report = checker.check(&q, &ProjectScope::new("p1")).await.unwrap();
    assert!(report.is_consistent(), "{report:?}");
    assert_eq!(report.v1_rows, 1);
}

#[tokio::test]
async fn test_checker_attributes_renamed_trace() {
    let executor = seeded();
    // v1 sees the rename, the events keep the name they were written with
    executor
        .execute_batch("UPDATE traces SET name = 'renamed' WHERE id = 't00';")
        .unwrap();
    let checker = ConsistencyChecker::new(compiler(), executor, ConsistencyPolicy::default());
    let q = query("traces")
        .dimension("name")
        .metric("count", Aggregation::Count);
    let report = checker.check(&q, &ProjectScope::new("p1")).await.unwrap();

    assert!(!report.is_consistent());
    assert_eq!(report.source, DivergenceSource::DenormalizedSourceOfTruth);
    assert_eq!(report.missing_in_v2, vec![r#"["renamed"]"#]);
    assert_eq!(report.divergences.len(), 1);
    assert_eq!(report.divergences[0].key, r#"["chat"]"#);
    assert_eq!(report.divergences[0].v1, 3.0);
    assert_eq!(report.divergences[0].v2, 4.0);
}

#[tokio::test]
async fn test_project_and_window_scoping() {
    let executor = seeded();
    let q = query("observations").metric("count", Aggregation::Count);
    for version in [SchemaVersion::V1, SchemaVersion::V2] {
        let rows = run(&executor, &q, version, false).await;
        assert_eq!(count(&rows), 2 * TRACES as i64);
    }
}

#[tokio::test]
async fn test_none_of_equals_any_of_complement() {
    let executor = seeded();
    let deselected = vec!["chat".to_string(), "search".to_string()];
    let selected: Vec<String> = NAMES
        .iter()
        .filter(|n| !deselected.iter().any(|d| d == *n))
        .map(|n| n.to_string())
        .collect();

    let base = query("traces").metric("count", Aggregation::Count);
    let none_of = base.clone().filter(Filter::StringOptions {
        column: "name".into(),
        operator: OptionsOp::NoneOf,
        value: deselected,
    });
    let any_of = base.filter(Filter::StringOptions {
        column: "name".into(),
        operator: OptionsOp::AnyOf,
        value: selected,
    });

    for version in [SchemaVersion::V1, SchemaVersion::V2] {
        let a = run(&executor, &none_of, version, false).await;
        let b = run(&executor, &any_of, version, false).await;
        assert_eq!(count(&a), 12);
        assert_eq!(a, b);
    }
}

#[tokio::test]
async fn test_first_position_counts_one_per_trace() {
    let executor = seeded();
    let q = query("observations")
        .metric("count", Aggregation::Count)
        .filter(Filter::Position {
            column: "positionInTrace".into(),
            operator: NumberOp::Eq,
            value: 1,
            from_end: false,
        });
    for version in [SchemaVersion::V1, SchemaVersion::V2] {
        let rows = run(&executor, &q, version, false).await;
        assert_eq!(count(&rows), TRACES as i64);
    }
}

/// Group the p1 traces into four sessions, s0 to s3, in both layouts
fn assign_sessions(executor: &DuckdbExecutor) {
    let session = |column: &str| {
        format!("'s' || CAST(CAST(substr({column}, 2) AS INTEGER) % 4 AS VARCHAR)")
    };
    executor
        .execute_batch(&format!(
            "UPDATE traces SET session_id = {} WHERE project_id = 'p1' AND id LIKE 't%';
             UPDATE events SET session_id = {} WHERE project_id = 'p1' AND trace_id LIKE 't%';",
            session("id"),
            session("trace_id"),
        ))
        .unwrap();
}

fn key_any_of(view: &str, ids: &[&str]) -> DeclarativeQuery {
    query(view)
        .metric("count", Aggregation::Count)
        .filter(Filter::StringOptions {
            column: "id".into(),
            operator: OptionsOp::AnyOf,
            value: ids.iter().map(|s| s.to_string()).collect(),
        })
}

#[tokio::test]
async fn test_empty_key_any_of_matches_unfiltered() {
    let executor = seeded();
    assign_sessions(&executor);
    for (view, expected) in [("traces", TRACES as i64), ("sessions", 4)] {
        let unfiltered = query(view).metric("count", Aggregation::Count);
        let empty = key_any_of(view, &[]);
        for version in [SchemaVersion::V1, SchemaVersion::V2] {
            let all = run(&executor, &unfiltered, version, false).await;
            let rows = run(&executor, &empty, version, false).await;
            assert_eq!(count(&all), expected, "{view} {version}");
            assert_eq!(count(&rows), expected, "{view} {version}");
        }
    }
}

#[tokio::test]
async fn test_key_allow_list_same_rows_across_versions() {
    let executor = seeded();
    assign_sessions(&executor);
    for (view, ids, expected) in [
        ("traces", &["t00", "t01", "t02", "missing"][..], 3),
        ("sessions", &["s1", "s2"][..], 2),
    ] {
        let q = key_any_of(view, ids)
            .dimension("id")
            .order_by("count_count", SortDirection::Desc)
            .row_limit(100);
        let v1 = run(&executor, &q, SchemaVersion::V1, false).await;
        let v2 = run(&executor, &q, SchemaVersion::V2, false).await;
        assert_eq!(v1.len(), expected, "{view}");
        assert_eq!(v1, v2, "{view}");
    }
}

fn payload_query() -> DeclarativeQuery {
    query("traces")
        .dimension("id")
        .dimension("name")
        .dimension("input")
        .metric("count", Aggregation::Count)
        .order_by("count_count", SortDirection::Desc)
        .row_limit(5)
}

#[tokio::test]
async fn test_split_returns_same_rows() {
    let executor = seeded();
    let q = payload_query();
    for version in [SchemaVersion::V1, SchemaVersion::V2] {
        let single = run(&executor, &q, version, false).await;
        let split = run(&executor, &q, version, true).await;
        assert_eq!(single.len(), 5);
        assert_eq!(single, split);
        assert_eq!(split[0]["id"], "t00");
        assert_eq!(split[0]["input"], "in-t00");
    }
}
