//! Query parameters and the collector that names them during rendering.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// ClickHouse textual timestamp format accepted for `DateTime64(3)` parameters.
pub const PARAM_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl ParamValue {
    /// ClickHouse type name used inside `{name: Type}` placeholders
    pub fn clickhouse_type(&self) -> &'static str {
        match self {
            ParamValue::String(_) => "String",
            ParamValue::Int(_) => "Int64",
            ParamValue::Float(_) => "Float64",
            ParamValue::Bool(_) => "Bool",
            ParamValue::DateTime(_) => "DateTime64(3)",
        }
    }

    /// Canonical text form, used for cache fingerprints and ClickHouse binding
    pub fn to_text(&self) -> String {
        match self {
            ParamValue::String(s) => s.clone(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::DateTime(dt) => dt.format(PARAM_TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::String(s) => serializer.serialize_str(s),
            ParamValue::Int(i) => serializer.serialize_i64(*i),
            ParamValue::Float(f) => serializer.serialize_f64(*f),
            ParamValue::Bool(b) => serializer.serialize_bool(*b),
            ParamValue::DateTime(dt) => {
                serializer.serialize_str(&dt.format(PARAM_TIMESTAMP_FORMAT).to_string())
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::DateTime(value)
    }
}

/// How a parameter is named in the rendered query.
///
/// `Fixed` names are shared: every occurrence with an equal value renders as the
/// same placeholder (project scope, time window). `Hint` names get a numeric
/// suffix per occurrence so composed fragments never collide.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamName {
    Fixed(&'static str),
    Hint(String),
}

/// A parameter node inside an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: ParamName,
    pub value: ParamValue,
}

impl Param {
    pub fn fixed(name: &'static str, value: impl Into<ParamValue>) -> Self {
        Self {
            name: ParamName::Fixed(name),
            value: value.into(),
        }
    }

    pub fn hint(hint: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: ParamName::Hint(sanitize_hint(&hint.into())),
            value: value.into(),
        }
    }
}

/// Keep only identifier characters so hints are valid placeholder names.
fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("p_{cleaned}")
    } else {
        cleaned
    }
}

/// Collects parameters while a query is rendered.
#[derive(Debug, Default)]
pub struct ParamCollector {
    values: BTreeMap<String, ParamValue>,
    counter: usize,
}

impl ParamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter, returning the name it renders under.
    pub fn register(&mut self, param: &Param) -> String {
        let name = match &param.name {
            ParamName::Fixed(name) => match self.values.get(*name) {
                None => (*name).to_string(),
                Some(existing) if *existing == param.value => return (*name).to_string(),
                Some(_) => self.next_name(name),
            },
            ParamName::Hint(hint) => self.next_name(hint),
        };
        self.values.insert(name.clone(), param.value.clone());
        name
    }

    fn next_name(&mut self, base: &str) -> String {
        loop {
            let candidate = format!("{}_{}", base, self.counter);
            self.counter += 1;
            if !self.values.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn into_values(self) -> BTreeMap<String, ParamValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_params_are_shared() {
        let mut params = ParamCollector::new();
        let a = params.register(&Param::fixed("projectId", "p1"));
        let b = params.register(&Param::fixed("projectId", "p1"));
        assert_eq!(a, "projectId");
        assert_eq!(a, b);
        assert_eq!(params.into_values().len(), 1);
    }

    #[test]
    fn test_fixed_param_conflict_gets_new_name() {
        let mut params = ParamCollector::new();
        let a = params.register(&Param::fixed("projectId", "p1"));
        let b = params.register(&Param::fixed("projectId", "p2"));
        assert_ne!(a, b);
        assert_eq!(params.get(&b), Some(&ParamValue::from("p2")));
    }

    #[test]
    fn test_hint_params_never_collide() {
        let mut params = ParamCollector::new();
        let a = params.register(&Param::hint("name", "x"));
        let b = params.register(&Param::hint("name", "x"));
        assert_eq!(a, "name_0");
        assert_eq!(b, "name_1");
        assert_eq!(params.into_values().len(), 2);
    }

    #[test]
    fn test_hint_sanitized() {
        let p = Param::hint("scores.avg-1", 1i64);
        assert_eq!(p.name, ParamName::Hint("scores_avg_1".to_string()));
        let p = Param::hint("1st", 1i64);
        assert_eq!(p.name, ParamName::Hint("p_1st".to_string()));
    }

    #[test]
    fn test_clickhouse_types() {
        assert_eq!(ParamValue::from("a").clickhouse_type(), "String");
        assert_eq!(ParamValue::from(1i64).clickhouse_type(), "Int64");
        assert_eq!(ParamValue::from(1.5f64).clickhouse_type(), "Float64");
        assert_eq!(ParamValue::from(true).clickhouse_type(), "Bool");
    }
}
