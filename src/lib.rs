//! covgen - Many-objective evolutionary test generation.
//!
//! This crate generates unit tests for an instrumented Rust crate by evolving
//! sequences of calls, guided by the control dependence graphs of the code
//! under test and the branch distances its instrumented build reports.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Types, callables, analysis records, configuration and progress
//! - `compute`: Catalog queries, test cases, coverage fitness and the search
//!
//! # Example
//!
//! ```rust,no_run
//! use covgen::{
//!     compute::{catalog::Catalog, coverage::MirAnalysis},
//!     CommandExecutor, SearchConfig, SearchEngine,
//! };
//!
//! let config = SearchConfig::default();
//! let catalog = Catalog::load("hir.json").unwrap();
//! let analysis = MirAnalysis::load_dir("mir").unwrap();
//! let executor = CommandExecutor::new(config.execution.clone(), config.output.clone());
//!
//! let mut engine = SearchEngine::new(config, catalog, analysis, executor).unwrap();
//! let result = engine.run().unwrap();
//!
//! println!("Coverage: {:.1}%", result.stats.coverage);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{CommandExecutor, SearchEngine, SearchError, SearchResult};
pub use schema::{SearchConfig, SearchStats};
