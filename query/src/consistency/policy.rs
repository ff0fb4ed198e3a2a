use serde::{Deserialize, Serialize};

use crate::views::Aggregation;

/// Why a v1 and a v2 answer are allowed to differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DivergenceSource {
    /// Rows near the edges of the window land on different sides of it
    TimeWindowBoundary,
    /// v2 reads a copy of an attribute that changed after the events were written
    DenormalizedSourceOfTruth,
}

impl DivergenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DivergenceSource::TimeWindowBoundary => "time_window_boundary",
            DivergenceSource::DenormalizedSourceOfTruth => "denormalized_source_of_truth",
        }
    }
}

impl std::fmt::Display for DivergenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative tolerances for comparing v1 and v2 answers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyPolicy {
    /// Totals not bucketed by time must match exactly
    pub exact_totals: bool,
    pub lag_tolerance: f64,
    pub percentile_tolerance: f64,
    /// Compared on total bucket mass
    pub histogram_tolerance: f64,
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        Self {
            exact_totals: true,
            lag_tolerance: 0.05,
            percentile_tolerance: 0.10,
            histogram_tolerance: 0.15,
        }
    }
}

impl ConsistencyPolicy {
    /// Allowed relative error for one metric
    pub fn tolerance_for(&self, aggregation: Aggregation, time_bucketed: bool) -> f64 {
        match aggregation {
            a if a.is_percentile() => self.percentile_tolerance,
            Aggregation::Histogram => self.histogram_tolerance,
            _ if self.exact_totals && !time_bucketed => 0.0,
            _ => self.lag_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerances() {
        let policy = ConsistencyPolicy::default();
        assert_eq!(policy.tolerance_for(Aggregation::Count, false), 0.0);
        assert_eq!(policy.tolerance_for(Aggregation::Sum, true), 0.05);
        assert_eq!(policy.tolerance_for(Aggregation::P95, false), 0.10);
        assert_eq!(policy.tolerance_for(Aggregation::Histogram, false), 0.15);
    }

    #[test]
    fn test_partial_config() {
        let policy: ConsistencyPolicy =
            serde_json::from_str(r#"{"exact_totals": false, "lag_tolerance": 0.2}"#).unwrap();
        assert_eq!(policy.tolerance_for(Aggregation::Count, false), 0.2);
        assert_eq!(policy.percentile_tolerance, 0.10);
    }
}
