//! Test case representation and construction.
//!
//! # Overview
//!
//! A test case is an ordered list of statements over an arena of typed
//! variables. Every argument refers to a variable returned by an earlier
//! statement; moves and borrows are derived from the statements, never stored.
//!
//! - **Values** (`value`): primitive literals and their mutation
//! - **Statements** (`statement`): calls, literals, references and containers
//! - **Test cases** (`test_case`): ownership queries, structural edits, coverage
//! - **Construction** (`generate`): argument reuse and fresh value generation
//! - **Generators** (`generators`): random, seeded and all-callables seeding
//! - **Rendering** (`render`): Rust source for execution and snapshots
//!
//! # Example
//!
//! ```rust,no_run
//! use covgen::compute::catalog::{Catalog, CallableUsage};
//! use covgen::compute::chromosome::{ChromosomeGenerator, GenContext, RandomGenerator, render_test};
//! use covgen::compute::coverage::ConstantPool;
//! use covgen::compute::evolution::SearchRng;
//! use covgen::schema::SearchConfig;
//!
//! let catalog = Catalog::load("hir.json").unwrap();
//! let config = SearchConfig::default();
//! let constants = ConstantPool::default();
//! let usage = CallableUsage::default();
//! let mut rng = SearchRng::new(42);
//! let mut ctx = GenContext::new(&catalog, &config, &constants, &usage, &mut rng);
//!
//! let tc = RandomGenerator.next(&mut ctx, 0).unwrap();
//! println!("{}", render_test(&tc, &config.output));
//! ```

#[cfg(test)]
pub(crate) mod fixtures;
mod generate;
mod generators;
mod render;
mod statement;
mod test_case;
mod value;

pub use generate::*;
pub use generators::*;
pub use render::*;
pub use statement::*;
pub use test_case::*;
pub use value::*;
