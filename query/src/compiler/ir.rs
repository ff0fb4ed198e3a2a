//! Declarative query IR
//!
//! The camelCase wire shape sent by dashboards and tables.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::filters::{Filter, FilterList};
use crate::sql::expr::TimeGrain;
use crate::views::Aggregation;

/// Output column holding the time bucket
pub const TIME_DIMENSION: &str = "time_dimension";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativeQuery {
    pub view: String,
    #[serde(default)]
    pub dimensions: Vec<DimensionRef>,
    #[serde(default)]
    pub metrics: Vec<MetricRef>,
    #[serde(default)]
    pub time_dimension: Option<TimeDimension>,
    #[serde(default)]
    pub filters: FilterList,
    #[serde(default)]
    pub order_by: Option<Vec<OrderBy>>,
    pub from_timestamp: DateTime<Utc>,
    pub to_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub chart_config: Option<ChartConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRef {
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRef {
    pub measure: String,
    pub aggregation: Aggregation,
}

impl MetricRef {
    /// Output column name, `{aggregation}_{measure}`
    pub fn alias(&self) -> String {
        format!("{}_{}", self.aggregation.as_str(), self.measure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeDimension {
    pub granularity: Granularity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Auto,
}

impl Granularity {
    /// Concrete bucket size; `auto` picks one from the window length
    pub fn resolve(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> TimeGrain {
        match self {
            Granularity::Minute => TimeGrain::Minute,
            Granularity::Hour => TimeGrain::Hour,
            Granularity::Day => TimeGrain::Day,
            Granularity::Week => TimeGrain::Week,
            Granularity::Month => TimeGrain::Month,
            Granularity::Auto => {
                let window = to - from;
                if window <= Duration::hours(2) {
                    TimeGrain::Minute
                } else if window <= Duration::hours(72) {
                    TimeGrain::Hour
                } else if window <= Duration::days(60) {
                    TimeGrain::Day
                } else if window <= Duration::days(365) {
                    TimeGrain::Week
                } else {
                    TimeGrain::Month
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default)]
    pub row_limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl DeclarativeQuery {
    pub fn new(view: impl Into<String>, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            view: view.into(),
            dimensions: Vec::new(),
            metrics: Vec::new(),
            time_dimension: None,
            filters: FilterList::default(),
            order_by: None,
            from_timestamp: from,
            to_timestamp: to,
            chart_config: None,
        }
    }

    pub fn dimension(mut self, field: impl Into<String>) -> Self {
        self.dimensions.push(DimensionRef {
            field: field.into(),
        });
        self
    }

    pub fn metric(mut self, measure: impl Into<String>, aggregation: Aggregation) -> Self {
        self.metrics.push(MetricRef {
            measure: measure.into(),
            aggregation,
        });
        self
    }

    pub fn time_dimension(mut self, granularity: Granularity) -> Self {
        self.time_dimension = Some(TimeDimension { granularity });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        let mut filters: Vec<Filter> = self.filters.iter().cloned().collect();
        filters.push(filter);
        self.filters = FilterList::new(filters);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.get_or_insert_with(Vec::new).push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn row_limit(mut self, limit: u64) -> Self {
        self.chart_config.get_or_insert_with(ChartConfig::default).row_limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.chart_config.get_or_insert_with(ChartConfig::default).offset = Some(offset);
        self
    }

    pub fn limit(&self) -> Option<u64> {
        self.chart_config.and_then(|c| c.row_limit)
    }

    pub fn skip(&self) -> Option<u64> {
        self.chart_config.and_then(|c| c.offset)
    }

    pub fn orderings(&self) -> &[OrderBy] {
        self.order_by.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    #[test]
    fn test_wire_shape() {
        let json = r#"{
            "view": "traces",
            "dimensions": [{"field": "name"}],
            "metrics": [{"measure": "count", "aggregation": "count"}],
            "timeDimension": null,
            "filters": [],
            "orderBy": [{"field": "count_count", "direction": "desc"}],
            "fromTimestamp": "2024-01-01T00:00:00Z",
            "toTimestamp": "2024-01-02T01:00:00Z",
            "chartConfig": {"row_limit": 100}
        }"#;
        let query: DeclarativeQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.view, "traces");
        assert_eq!(query.metrics[0].alias(), "count_count");
        assert_eq!(query.limit(), Some(100));
        assert_eq!(query.skip(), None);
        assert_eq!(query.orderings()[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{
            "view": "traces",
            "fromTimestamp": "2024-01-01T00:00:00Z",
            "toTimestamp": "2024-01-02T00:00:00Z"
        }"#;
        let query: DeclarativeQuery = serde_json::from_str(json).unwrap();
        assert!(query.dimensions.is_empty());
        assert!(query.filters.is_empty());
        assert!(query.orderings().is_empty());
        assert_eq!(query.limit(), None);
    }

    #[test]
    fn test_auto_granularity() {
        let auto = Granularity::Auto;
        assert_eq!(auto.resolve(at(0), at(2)), TimeGrain::Minute);
        assert_eq!(auto.resolve(at(0), at(3)), TimeGrain::Hour);
        assert_eq!(auto.resolve(at(0), at(72)), TimeGrain::Hour);
        assert_eq!(auto.resolve(at(0), at(24 * 30)), TimeGrain::Day);
        assert_eq!(auto.resolve(at(0), at(24 * 200)), TimeGrain::Week);
        assert_eq!(auto.resolve(at(0), at(24 * 400)), TimeGrain::Month);
        assert_eq!(Granularity::Day.resolve(at(0), at(1)), TimeGrain::Day);
    }

    #[test]
    fn test_builder() {
        let query = DeclarativeQuery::new("traces", at(0), at(1))
            .dimension("name")
            .metric("count", Aggregation::Count)
            .order_by("count_count", SortDirection::Desc)
            .row_limit(10)
            .offset(5);
        assert_eq!(query.dimensions.len(), 1);
        assert_eq!(query.limit(), Some(10));
        assert_eq!(query.skip(), Some(5));
    }
}
