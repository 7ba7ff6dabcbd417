//! Generic forward data flow framework.
//!
//! - [`DataFlowAnalysis`] - the contract an analysis implements (bottom,
//!   entry state, join, equality, block transfer, per-edge propagation)
//! - [`DataFlowSolver`] - the worklist engine computing the fixed point
//! - [`AnalysisResults`] - per-block and per-edge fixed-point states
//!
//! Both the address resolution interpreter and the per-set cache analysis are
//! instances of this framework.

mod framework;
mod solver;

pub use framework::{AnalysisResults, DataFlowAnalysis, Incoming};
pub use solver::{DataFlowSolver, DEFAULT_MAX_VISITS};
