//! Evolutionary search module for generating covering test suites.
//!
//! This module evolves a population of test cases until every branch target
//! of the instrumented crate has a covering test, or the budget runs out.
//!
//! # Overview
//!
//! The search system consists of:
//!
//! - **Variation** (`mutation`, `crossover`): statement-level deletion, change
//!   and insertion, and single-point crossover with variable rewiring
//! - **Ranking** (`ranking`): preference sorting, non-dominated fronts and
//!   subvector dominance
//! - **Selection** (`selection`): linear rank-biased parent choice
//! - **Archive** (`archive`): shortest covering test per target
//! - **Execution** (`executor`): running batches and reading back their traces
//! - **Search** (`search`): the MOSA and DynaMOSA generation loop
//!
//! # Example
//!
//! ```rust,no_run
//! use covgen::compute::catalog::Catalog;
//! use covgen::compute::coverage::MirAnalysis;
//! use covgen::compute::evolution::{CommandExecutor, SearchEngine};
//! use covgen::schema::SearchConfig;
//!
//! let config = SearchConfig::default();
//! let catalog = Catalog::load("hir.json").unwrap();
//! let analysis = MirAnalysis::load_dir("mir").unwrap();
//! let executor = CommandExecutor::new(config.execution.clone(), config.output.clone());
//!
//! let mut engine = SearchEngine::new(config, catalog, analysis, executor).unwrap();
//! let result = engine
//!     .run_with_callback(|progress| {
//!         println!("Generation {}: {:.1}% covered", progress.generation, progress.coverage);
//!     })
//!     .unwrap();
//!
//! println!("{} tests cover {} targets", result.tests.len(), result.stats.covered_targets);
//! ```

mod archive;
mod crossover;
mod executor;
mod mutation;
pub mod ranking;
mod rng;
mod search;
mod selection;
mod snapshot;

pub use archive::*;
pub use crossover::*;
pub use executor::*;
pub use mutation::*;
pub use rng::*;
pub use search::*;
pub use selection::*;
pub use snapshot::*;
