//! v1/v2 consistency contract
//!
//! A query that does not depend on the schema version must give the same
//! answer against both layouts. Totals agree exactly unless grouped by time;
//! fields v2 reads from denormalized event columns may lag their owning entity.
//! Every tolerated difference is attributed to a [`DivergenceSource`].

mod checker;
mod compare;
mod policy;

#[cfg(test)]
mod tests;

pub use checker::{CheckError, ConsistencyChecker};
pub use compare::{ConsistencyReport, MetricDivergence, compare_results};
pub use policy::{ConsistencyPolicy, DivergenceSource};
