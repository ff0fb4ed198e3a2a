//! Logical views over the v1 and v2 layouts

pub mod observations;
mod registry;
pub mod scores;
pub mod sessions;
pub mod traces;
mod types;

pub use registry::{RegistryError, ViewRegistry, ViewRegistryBuilder, builtin_declarations};
pub use types::{
    Aggregation, ColumnRef, DimensionDecl, HISTOGRAM_BUCKETS, MeasureDecl, OrdinalDecl,
    PayloadDecl, Relation, RelationDecl, SchemaVersion, Source, ValueType, ViewDeclaration,
};
