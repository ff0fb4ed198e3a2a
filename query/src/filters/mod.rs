//! Typed filters
//!
//! Each filter kind compiles to a predicate [`crate::sql::expr::Expr`] over a
//! view. [`FilterList`] combines them with AND and lets the compiler inspect
//! which columns are filtered before deciding on joins.

mod compile;
mod list;
mod parser;
mod types;

pub use compile::FilterContext;
pub use list::FilterList;
pub use parser::{
    MAX_FILTER_JSON_SIZE, MAX_FILTERS, check_filter_size, check_filters, parse_filters,
    parse_filters_with_limit,
};
pub use types::{
    ArrayOp, BooleanOp, DatetimeOp, Filter, NullOp, NumberOp, OptionsOp, SearchOp, StringOp,
};
