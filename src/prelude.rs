//! # pidcache Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the pidcache library: building a control flow graph, configuring the cache and
//! memory, running the analysis and reading its results.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all pidcache operations
pub use crate::Error;

/// The result type used throughout pidcache
pub use crate::Result;

// ================================================================================================
// Program Representation
// ================================================================================================

/// Control flow graph construction and loop information
pub use crate::analysis::{
    BasicBlock, CfgBuilder, CfgEdge, CfgEdgeKind, ControlFlowGraph, LoopBound, LoopForest,
};

/// Semantic micro-operations describing instructions
pub use crate::analysis::{AccessRange, BinOp, Instruction, MemType, Reg, SemOp, UnOp};

/// Node identifiers shared by every graph
pub use crate::utils::graph::NodeId;

// ================================================================================================
// Symbolic Addresses
// ================================================================================================

/// Polynomial address domain
pub use crate::address::{Poly, PolyDomain};

/// Program state at entry and access records
pub use crate::address::{Access, AccessKind, InitialState};

// ================================================================================================
// Cache Configuration
// ================================================================================================

/// Cache geometry, replacement policy and analysis tuning
pub use crate::cache::{AnalysisConfig, CacheConfig, CacheConfiguration, ReplacementPolicy};

/// Memory banks of the platform
pub use crate::cache::{MemoryBank, MemoryMap};

// ================================================================================================
// Analysis and Results
// ================================================================================================

/// Whole-program data cache analysis
pub use crate::cache::{ClassifiedAccess, PidAnalysis, PidResults};

/// Classification counters and summaries
pub use crate::cache::{Category, MissCount, Stat, Statistics};

/// Miss penalty for timing models
pub use crate::cache::miss_penalty;
