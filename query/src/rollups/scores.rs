//! Score rollups
//!
//! Scores are first averaged per (entity, name, data type, category) and only
//! then collected into `(label, value)` pairs per entity. Filters on the pairs
//! therefore compare against complete averages.

use super::{AggregationCte, RollupKind, RollupScope};
use crate::sql::expr::{AggFunc, Expr, agg, agg_if, and, col, raw};
use crate::sql::query::{FromItem, Select};

/// What a score is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreLevel {
    Trace,
    Observation,
}

impl ScoreLevel {
    fn key_column(&self) -> &'static str {
        match self {
            ScoreLevel::Trace => "trace_id",
            ScoreLevel::Observation => "observation_id",
        }
    }

    /// Discriminator between trace- and observation-level scores
    fn discriminator(&self, alias: &str) -> Expr {
        match self {
            ScoreLevel::Trace => col(alias, "observation_id").is_null(),
            ScoreLevel::Observation => col(alias, "observation_id").is_not_null(),
        }
    }

    fn kind(&self) -> RollupKind {
        match self {
            ScoreLevel::Trace => RollupKind::TraceScores,
            ScoreLevel::Observation => RollupKind::ObservationScores,
        }
    }
}

const S: &str = "s";
const SC: &str = "sc";

pub fn numeric_data_type(alias: &str) -> Expr {
    raw(format!("{}.data_type IN ('NUMERIC', 'BOOLEAN')", alias))
}

pub fn categorical_data_type(alias: &str) -> Expr {
    raw(format!("{}.data_type = 'CATEGORICAL'", alias))
}

pub(super) fn score_rollup(level: ScoreLevel, scope: &RollupScope) -> AggregationCte {
    let key = level.key_column();

    let mut conditions = vec![level.discriminator(S)];
    conditions.extend(scope.conditions(S, "timestamp", key));

    let per_name = Select::from(FromItem::table("scores", S, true))
        .column(col(S, "project_id"), "project_id")
        .column(col(S, key), key)
        .column(col(S, "name"), "name")
        .column(col(S, "data_type"), "data_type")
        .column(col(S, "string_value"), "string_value")
        .column(agg(AggFunc::Avg, vec![col(S, "value")]), "avg_value")
        .filter(and(conditions))
        .group_by(col(S, "project_id"))
        .group_by(col(S, key))
        .group_by(col(S, "name"))
        .group_by(col(S, "data_type"))
        .group_by(col(S, "string_value"));

    let query = Select::from(FromItem::subquery(per_name, SC))
        .column(col(SC, "project_id"), "project_id")
        .column(col(SC, key), key)
        .column(
            agg_if(
                AggFunc::PairList,
                vec![col(SC, "name"), col(SC, "avg_value")],
                numeric_data_type(SC),
            ),
            "scores_avg",
        )
        .column(
            agg_if(
                AggFunc::PairList,
                vec![col(SC, "name"), col(SC, "string_value")],
                categorical_data_type(SC),
            ),
            "score_categories",
        )
        .group_by(col(SC, "project_id"))
        .group_by(col(SC, key));

    AggregationCte {
        name: level.kind().cte_name(),
        columns: vec!["project_id", key, "scores_avg", "score_categories"],
        query,
    }
}
