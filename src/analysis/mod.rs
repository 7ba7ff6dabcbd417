//! Program representation and generic analysis infrastructure.
//!
//! - [`cfg`] - control flow graphs, loop forests and edge classification
//! - [`dataflow`] - the worklist fixed-point framework
//! - [`sem`] - semantic micro-operations describing instructions

pub mod cfg;
pub mod dataflow;
pub mod sem;

pub use cfg::{
    BasicBlock, CfgBuilder, CfgEdge, CfgEdgeKind, ControlFlowGraph, LoopBound, LoopForest,
    LoopInfo,
};
pub use dataflow::{AnalysisResults, DataFlowAnalysis, DataFlowSolver, Incoming};
pub use sem::{AccessRange, BinOp, Instruction, MemType, Reg, SemOp, UnOp};
