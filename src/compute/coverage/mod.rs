//! Coverage model: dependency graphs, targets and fitness.
//!
//! # Overview
//!
//! - **Dependency graphs** (`cdg`): control dependence per function, root paths
//!   and approach levels
//! - **Analysis** (`mir`): every graph of the program under test, its constant
//!   pool and the dynamic target frontier
//! - **Fitness** (`fitness`): approach level plus normalized branch distance,
//!   cached per test case
//! - **Traces** (`trace`): distance observations delivered by test runs
//!
//! # Example
//!
//! ```rust,no_run
//! use covgen::compute::coverage::{MirAnalysis, TargetFrontier};
//!
//! let analysis = MirAnalysis::load_dir("analysis/").unwrap();
//! let frontier = TargetFrontier::new(&analysis);
//! println!("{} of {} targets start active",
//!     frontier.active().len(), analysis.targets().len());
//! ```

mod cdg;
pub mod fitness;
mod mir;
mod trace;

pub use cdg::*;
pub use fitness::{MAX_FITNESS, normalize};
pub use mir::*;
pub use trace::*;
