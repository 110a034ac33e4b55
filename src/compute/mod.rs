//! Compute module - Catalog queries, test construction, coverage and search.

pub mod catalog;
pub mod chromosome;
pub mod coverage;
pub mod evolution;
