//! Control flow graphs and loop structure.
//!
//! - [`ControlFlowGraph`] - immutable graph of [`BasicBlock`]s built through
//!   [`CfgBuilder`], with dominators and natural loops computed at build time
//! - [`CfgEdge`] / [`CfgEdgeKind`] - edges classified as ordinary, loop entry,
//!   back edge or loop exit
//! - [`LoopForest`] / [`LoopInfo`] / [`LoopBound`] - loop nesting and iteration bounds

mod edge;
mod graph;
mod loops;

pub use edge::{CfgEdge, CfgEdgeKind};
pub use graph::{BasicBlock, CfgBuilder, ControlFlowGraph};
pub use loops::{detect_loops, LoopBound, LoopForest, LoopInfo};
