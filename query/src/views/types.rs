//! View declaration types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rollups::RollupKind;
use crate::sql::expr::{AggFunc, Expr, agg, count_distinct};

/// Physical schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// Normalized tables: traces, observations, scores
    #[serde(rename = "v1")]
    V1,
    /// Single append-only events table
    #[serde(rename = "v2")]
    V2,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1 => "v1",
            SchemaVersion::V2 => "v2",
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(SchemaVersion::V1),
            "v2" | "2" => Ok(SchemaVersion::V2),
            other => Err(format!("Invalid schema version '{}'. Use: v1 or v2", other)),
        }
    }
}

/// Aggregation applied to a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Count,
    #[serde(alias = "uniq")]
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
    P50,
    P75,
    P90,
    P95,
    P99,
    Histogram,
}

/// Bucket count for histogram aggregations
pub const HISTOGRAM_BUCKETS: u32 = 10;

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Count => "count",
            Aggregation::CountDistinct => "count_distinct",
            Aggregation::Sum => "sum",
            Aggregation::Avg => "avg",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::P50 => "p50",
            Aggregation::P75 => "p75",
            Aggregation::P90 => "p90",
            Aggregation::P95 => "p95",
            Aggregation::P99 => "p99",
            Aggregation::Histogram => "histogram",
        }
    }

    /// Wrap a row-level expression in this aggregation
    pub fn apply(&self, expr: Expr) -> Expr {
        match self {
            Aggregation::Count => agg(AggFunc::Count, vec![expr]),
            Aggregation::CountDistinct => count_distinct(expr),
            Aggregation::Sum => agg(AggFunc::Sum, vec![expr]),
            Aggregation::Avg => agg(AggFunc::Avg, vec![expr]),
            Aggregation::Min => agg(AggFunc::Min, vec![expr]),
            Aggregation::Max => agg(AggFunc::Max, vec![expr]),
            Aggregation::P50 => agg(AggFunc::Quantile(0.5), vec![expr]),
            Aggregation::P75 => agg(AggFunc::Quantile(0.75), vec![expr]),
            Aggregation::P90 => agg(AggFunc::Quantile(0.9), vec![expr]),
            Aggregation::P95 => agg(AggFunc::Quantile(0.95), vec![expr]),
            Aggregation::P99 => agg(AggFunc::Quantile(0.99), vec![expr]),
            Aggregation::Histogram => agg(AggFunc::Histogram(HISTOGRAM_BUCKETS), vec![expr]),
        }
    }

    pub fn is_percentile(&self) -> bool {
        matches!(
            self,
            Aggregation::P50 | Aggregation::P75 | Aggregation::P90 | Aggregation::P95 | Aggregation::P99
        )
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const NUMERIC_AGGREGATIONS: &[Aggregation] = &[
    Aggregation::Count,
    Aggregation::Sum,
    Aggregation::Avg,
    Aggregation::Min,
    Aggregation::Max,
    Aggregation::P50,
    Aggregation::P75,
    Aggregation::P90,
    Aggregation::P95,
    Aggregation::P99,
    Aggregation::Histogram,
];
const IDENTIFIER_AGGREGATIONS: &[Aggregation] = &[Aggregation::Count, Aggregation::CountDistinct];
const BOOLEAN_AGGREGATIONS: &[Aggregation] = &[Aggregation::Count];
const BUCKETED_AGGREGATIONS: &[Aggregation] = &[Aggregation::Sum];

/// Value type of a dimension or measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Decimal,
    /// Text or identifier
    String,
    Boolean,
    /// Per-row count contributing to a categorical bucket
    CategoryCount,
    Datetime,
    StringArray,
    StringMap,
    NumberMap,
    /// `(label, number)` pairs from a score rollup
    ScoreNumbers,
    /// `(label, category)` pairs from a score rollup
    ScoreCategories,
    /// Rank of a row among its siblings; filter-only
    Ordinal,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Decimal => "decimal",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::CategoryCount => "category_count",
            ValueType::Datetime => "datetime",
            ValueType::StringArray => "string_array",
            ValueType::StringMap => "string_map",
            ValueType::NumberMap => "number_map",
            ValueType::ScoreNumbers => "score_numbers",
            ValueType::ScoreCategories => "score_categories",
            ValueType::Ordinal => "ordinal",
        }
    }

    /// Aggregations valid for measures of this type
    pub fn permitted_aggregations(&self) -> &'static [Aggregation] {
        match self {
            ValueType::Integer | ValueType::Decimal => NUMERIC_AGGREGATIONS,
            ValueType::String => IDENTIFIER_AGGREGATIONS,
            ValueType::Boolean => BOOLEAN_AGGREGATIONS,
            ValueType::CategoryCount => BUCKETED_AGGREGATIONS,
            _ => &[],
        }
    }

    pub fn permits(&self, aggregation: Aggregation) -> bool {
        self.permitted_aggregations().contains(&aggregation)
    }

    /// Whether a dimension of this type can appear in GROUP BY
    pub fn is_groupable(&self) -> bool {
        matches!(
            self,
            ValueType::Integer
                | ValueType::Decimal
                | ValueType::String
                | ValueType::Boolean
                | ValueType::Datetime
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Integer | ValueType::Decimal | ValueType::CategoryCount
        )
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional join a field may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Per-trace observation statistics
    ObservationStats,
    /// The trace an observation or score belongs to
    ParentTrace,
    /// Scores attached directly to a trace
    TraceScores,
    /// Scores attached to an observation
    ObservationScores,
}

/// Where a view reads its rows from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table {
        name: &'static str,
        /// Deduplicated on read (ReplacingMergeTree)
        replacing: bool,
    },
    Rollup(RollupKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionDecl {
    pub sql: Expr,
    pub value_type: ValueType,
    pub high_cardinality: bool,
    pub requires: Option<Relation>,
    /// Large untruncated text, fetched separately in split mode
    pub payload: bool,
    /// Copied onto events at ingestion rather than read from its owning entity
    pub denormalized: bool,
    pub description: &'static str,
}

impl DimensionDecl {
    pub fn new(sql: Expr, value_type: ValueType) -> Self {
        Self {
            sql,
            value_type,
            high_cardinality: false,
            requires: None,
            payload: false,
            denormalized: false,
            description: "",
        }
    }

    pub fn high_cardinality(mut self) -> Self {
        self.high_cardinality = true;
        self
    }

    pub fn requires(mut self, relation: Relation) -> Self {
        self.requires = Some(relation);
        self
    }

    pub fn payload(mut self) -> Self {
        self.payload = true;
        self.high_cardinality = true;
        self
    }

    pub fn denormalized(mut self) -> Self {
        self.denormalized = true;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureDecl {
    pub sql: Expr,
    pub value_type: ValueType,
    pub requires: Option<Relation>,
    pub description: &'static str,
}

impl MeasureDecl {
    pub fn new(sql: Expr, value_type: ValueType) -> Self {
        Self {
            sql,
            value_type,
            requires: None,
            description: "",
        }
    }

    pub fn requires(mut self, relation: Relation) -> Self {
        self.requires = Some(relation);
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn permitted_aggregations(&self) -> &'static [Aggregation] {
        self.value_type.permitted_aggregations()
    }
}

/// How an optional relation is joined to the base source
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDecl {
    pub relation: Relation,
    pub source: Source,
    pub alias: &'static str,
    pub on: Expr,
    /// The relation is keyed by the view's own entity id
    pub entity_keyed: bool,
}

/// Sibling ranking used by position filters
#[derive(Debug, Clone, PartialEq)]
pub struct OrdinalDecl {
    pub table: &'static str,
    pub replacing: bool,
    /// Column compared against the view's entity key
    pub key: &'static str,
    pub partition_by: &'static str,
    pub order_by: &'static [&'static str],
    pub time_column: &'static str,
}

/// Where split mode fetches payload columns from
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadDecl {
    pub table: &'static str,
    pub replacing: bool,
    pub key: &'static str,
    pub time_column: &'static str,
    /// Payload dimension name to expression over alias `p`
    pub columns: Vec<(&'static str, Expr)>,
    /// Payload rows are aggregated per key
    pub grouped: bool,
}

/// A field a filter can target
#[derive(Debug, Clone, Copy)]
pub struct ColumnRef<'a> {
    pub sql: &'a Expr,
    pub value_type: ValueType,
    pub requires: Option<Relation>,
    pub payload: bool,
}

/// Logical view over one physical schema version
#[derive(Debug, Clone, PartialEq)]
pub struct ViewDeclaration {
    pub name: &'static str,
    pub version: SchemaVersion,
    pub description: &'static str,
    pub source: Source,
    pub alias: &'static str,
    /// Always-applied predicate narrowing the source (e.g. score data type)
    pub base_predicate: Option<Expr>,
    pub project_column: Expr,
    pub time_column: Expr,
    /// Dimension identifying one entity of this view
    pub entity_key: &'static str,
    pub dimensions: BTreeMap<&'static str, DimensionDecl>,
    pub measures: BTreeMap<&'static str, MeasureDecl>,
    pub relations: Vec<RelationDecl>,
    pub ordinal: Option<OrdinalDecl>,
    pub payload: Option<PayloadDecl>,
}

impl ViewDeclaration {
    pub fn new(
        name: &'static str,
        version: SchemaVersion,
        source: Source,
        alias: &'static str,
        time_column: Expr,
    ) -> Self {
        Self {
            name,
            version,
            description: "",
            source,
            alias,
            base_predicate: None,
            project_column: crate::sql::expr::col(alias, "project_id"),
            time_column,
            entity_key: "id",
            dimensions: BTreeMap::new(),
            measures: BTreeMap::new(),
            relations: Vec::new(),
            ordinal: None,
            payload: None,
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn base_predicate(mut self, predicate: Expr) -> Self {
        self.base_predicate = Some(predicate);
        self
    }

    pub fn dimension(mut self, name: &'static str, decl: DimensionDecl) -> Self {
        self.dimensions.insert(name, decl);
        self
    }

    pub fn measure(mut self, name: &'static str, decl: MeasureDecl) -> Self {
        self.measures.insert(name, decl);
        self
    }

    pub fn relation(mut self, decl: RelationDecl) -> Self {
        self.relations.push(decl);
        self
    }

    pub fn ordinal(mut self, decl: OrdinalDecl) -> Self {
        self.ordinal = Some(decl);
        self
    }

    pub fn payload(mut self, decl: PayloadDecl) -> Self {
        self.payload = Some(decl);
        self
    }

    pub fn get_dimension(&self, name: &str) -> Option<&DimensionDecl> {
        self.dimensions.get(name)
    }

    pub fn get_measure(&self, name: &str) -> Option<&MeasureDecl> {
        self.measures.get(name)
    }

    pub fn get_relation(&self, relation: Relation) -> Option<&RelationDecl> {
        self.relations.iter().find(|r| r.relation == relation)
    }

    /// Resolve a filter column against dimensions, then measures
    pub fn column(&self, name: &str) -> Option<ColumnRef<'_>> {
        if let Some(d) = self.dimensions.get(name) {
            return Some(ColumnRef {
                sql: &d.sql,
                value_type: d.value_type,
                requires: d.requires,
                payload: d.payload,
            });
        }
        self.measures.get(name).map(|m| ColumnRef {
            sql: &m.sql,
            value_type: m.value_type,
            requires: m.requires,
            payload: false,
        })
    }

    pub fn allowed_aggregations(&self, measure: &str) -> Option<&'static [Aggregation]> {
        self.measures.get(measure).map(MeasureDecl::permitted_aggregations)
    }
}
