//! Project scope and the shared scope parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sql::expr::{Expr, param};
use crate::sql::Param;

pub const PROJECT_PARAM: &str = "projectId";
pub const FROM_PARAM: &str = "fromTimestamp";
pub const TO_PARAM: &str = "toTimestamp";

/// Tenant boundary every compiled query is restricted to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectScope {
    pub project_id: String,
}

impl ProjectScope {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }
}

pub fn project_param(project_id: &str) -> Expr {
    param(Param::fixed(PROJECT_PARAM, project_id))
}

pub fn from_param(ts: DateTime<Utc>) -> Expr {
    param(Param::fixed(FROM_PARAM, ts))
}

pub fn to_param(ts: DateTime<Utc>) -> Expr {
    param(Param::fixed(TO_PARAM, ts))
}
