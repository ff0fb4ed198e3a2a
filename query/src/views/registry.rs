//! View registry
//!
//! An immutable map from (view, schema version) to its declaration. Built once
//! and shared with the compiler through an `Arc`.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::types::{Aggregation, Relation, SchemaVersion, ValueType, ViewDeclaration};
use super::{observations, scores, sessions, traces};
use crate::consistency::DivergenceSource;
use crate::error::QueryError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("View '{view}' is already registered for {version}")]
    DuplicateView {
        view: &'static str,
        version: SchemaVersion,
    },

    #[error("View '{view}' declares '{name}' as both a dimension and a measure")]
    NameCollision {
        view: &'static str,
        name: &'static str,
    },

    #[error("Field '{field}' of view '{view}' requires undeclared relation {relation:?}")]
    UndeclaredRelation {
        view: &'static str,
        field: &'static str,
        relation: Relation,
    },

    #[error("Field '{field}' of view '{view}' is ordinal but the view has no ordinal source")]
    MissingOrdinal {
        view: &'static str,
        field: &'static str,
    },
}

type Versions = BTreeMap<SchemaVersion, ViewDeclaration>;

/// Collects declarations and checks each one as it is added
#[derive(Debug, Default)]
pub struct ViewRegistryBuilder {
    views: FxHashMap<&'static str, Versions>,
}

impl ViewRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, view: ViewDeclaration) -> Result<Self, RegistryError> {
        check_declaration(&view)?;
        let versions = self.views.entry(view.name).or_default();
        if versions.contains_key(&view.version) {
            return Err(RegistryError::DuplicateView {
                view: view.name,
                version: view.version,
            });
        }
        versions.insert(view.version, view);
        Ok(self)
    }

    pub fn register_all(
        self,
        views: impl IntoIterator<Item = ViewDeclaration>,
    ) -> Result<Self, RegistryError> {
        views.into_iter().try_fold(self, |builder, view| builder.register(view))
    }

    pub fn build(self) -> ViewRegistry {
        ViewRegistry { views: self.views }
    }
}

fn check_declaration(view: &ViewDeclaration) -> Result<(), RegistryError> {
    if let Some(name) = view
        .dimensions
        .keys()
        .copied()
        .find(|name| view.measures.contains_key(name))
    {
        return Err(RegistryError::NameCollision {
            view: view.name,
            name,
        });
    }

    let required = view
        .dimensions
        .iter()
        .filter_map(|(name, d)| d.requires.map(|r| (*name, r)))
        .chain(
            view.measures
                .iter()
                .filter_map(|(name, m)| m.requires.map(|r| (*name, r))),
        );
    for (field, relation) in required {
        if view.get_relation(relation).is_none() {
            return Err(RegistryError::UndeclaredRelation {
                view: view.name,
                field,
                relation,
            });
        }
    }

    if view.ordinal.is_none() {
        if let Some((field, _)) = view
            .dimensions
            .iter()
            .find(|(_, d)| d.value_type == ValueType::Ordinal)
        {
            return Err(RegistryError::MissingOrdinal {
                view: view.name,
                field: *field,
            });
        }
    }
    Ok(())
}

/// Declarations shipped with the crate
pub fn builtin_declarations() -> Vec<ViewDeclaration> {
    let mut views = vec![traces::v1(), traces::v2(), observations::v1(), observations::v2()];
    for version in [SchemaVersion::V1, SchemaVersion::V2] {
        views.push(scores::numeric(version));
        views.push(scores::categorical(version));
        views.push(sessions::declaration(version));
    }
    views
}

#[derive(Debug)]
pub struct ViewRegistry {
    views: FxHashMap<&'static str, Versions>,
}

impl ViewRegistry {
    pub fn builder() -> ViewRegistryBuilder {
        ViewRegistryBuilder::new()
    }

    /// Registry holding the built-in views for both schema versions
    pub fn builtin() -> Self {
        let mut views: FxHashMap<&'static str, Versions> = FxHashMap::default();
        for view in builtin_declarations() {
            views.entry(view.name).or_default().insert(view.version, view);
        }
        Self { views }
    }

    pub fn resolve(&self, view: &str, version: SchemaVersion) -> Result<&ViewDeclaration, QueryError> {
        self.views
            .get(view)
            .and_then(|versions| versions.get(&version))
            .ok_or_else(|| QueryError::UnknownView {
                view: view.to_string(),
                version,
            })
    }

    /// Aggregations a measure may be combined with
    pub fn allowed_aggregations(
        &self,
        view: &str,
        version: SchemaVersion,
        measure: &str,
    ) -> Result<&'static [Aggregation], QueryError> {
        let decl = self.resolve(view, version)?;
        decl.allowed_aggregations(measure)
            .ok_or_else(|| QueryError::UnknownMeasure {
                view: view.to_string(),
                measure: measure.to_string(),
            })
    }

    /// Registered (view, version) pairs, sorted
    pub fn list(&self) -> Vec<(&'static str, SchemaVersion)> {
        let mut pairs: Vec<_> = self
            .views
            .iter()
            .flat_map(|(name, versions)| versions.keys().map(move |v| (*name, *v)))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn declarations(&self) -> impl Iterator<Item = &ViewDeclaration> {
        self.views.values().flat_map(|versions| versions.values())
    }

    /// Which divergence source explains a v1/v2 difference on `field`.
    ///
    /// Fields v2 reads from denormalized event columns diverge when the owning
    /// entity changed after the events were written. Everything else can only
    /// differ at the edges of the time window.
    pub fn divergence_source(&self, view: &str, field: &str) -> Result<DivergenceSource, QueryError> {
        let decl = self.resolve(view, SchemaVersion::V2)?;
        if let Some(dim) = decl.get_dimension(field) {
            return Ok(if dim.denormalized {
                DivergenceSource::DenormalizedSourceOfTruth
            } else {
                DivergenceSource::TimeWindowBoundary
            });
        }
        if decl.get_measure(field).is_some() {
            return Ok(DivergenceSource::TimeWindowBoundary);
        }
        Err(QueryError::UnknownDimension {
            view: view.to_string(),
            field: field.to_string(),
        })
    }
}
