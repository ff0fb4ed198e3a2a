use std::collections::BTreeMap;

use serde::Serialize;

use crate::sql::{Backend, ParamValue};
use crate::views::SchemaVersion;

/// Executable SQL for one backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub sql: String,
    pub params: BTreeMap<String, ParamValue>,
    /// Parameter names in placeholder order; positional backends bind in this order
    pub bind_order: Vec<String>,
    pub view: String,
    pub version: SchemaVersion,
    pub backend: Backend,
    /// Output column names, in select order
    pub columns: Vec<String>,
    pub split_applied: bool,
}

impl CompiledQuery {
    /// Parameter values in bind order
    pub fn ordered_params(&self) -> Vec<&ParamValue> {
        self.bind_order
            .iter()
            .filter_map(|name| self.params.get(name))
            .collect()
    }
}
