pub mod app;
pub mod compiler;
pub mod consistency;
pub mod core;
pub mod data;
pub mod error;
pub mod filters;
pub mod rollups;
pub mod scope;
pub mod sql;
pub mod utils;
pub mod validation;
pub mod views;
