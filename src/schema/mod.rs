//! Schema module - Data model, configuration and progress records for test generation.

mod callable;
mod config;
mod graph;
mod progress;
mod types;

pub use callable::*;
pub use config::*;
pub use graph::*;
pub use progress::*;
pub use types::*;
