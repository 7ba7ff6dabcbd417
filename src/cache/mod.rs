//! LRU data cache analysis.
//!
//! Classifies every data access of a program against one set-associative LRU
//! data cache. The analysis runs once per cache set; each run tracks, for
//! every symbolic reference that may map to its set, upper and lower bounds
//! on the line's age together with per-loop persistence ages.
//!
//! # Architecture
//!
//! - [`config`] - cache geometry and analysis tuning
//! - [`banks`] - memory banks: cacheability and latencies
//! - [`age`] - the must, may and persistence age domains
//! - [`refs`] - set membership and aliasing of symbolic references
//! - [`state`] - the abstract cache state of one set, hash-consed
//! - [`stats`] - per-access counters, miss counts and summaries
//! - [`analysis`] - per-set fixed points and the whole-program pipeline
//! - [`cost`] - miss penalties for timing models
//!
//! # Classification
//!
//! Each concrete address an access may touch (a *trial*) is classified:
//!
//! | Class | Meaning |
//! |-------|---------|
//! | AH | the line is certainly cached |
//! | PE | the line stays cached once loaded in the current loop execution |
//! | MM | another reference may have loaded the same line |
//! | AM | nothing may have loaded the line |
//! | NC | the iteration space is unknown |
//!
//! An access takes the class of its trials by precedence NC, AH (all trials),
//! PE, MM, then AM.

pub mod age;
pub mod analysis;
pub mod banks;
pub mod config;
pub mod cost;
pub mod refs;
pub mod state;
pub mod stats;

pub use age::{Age, AgeDomain, MayAge, MustAge, PersistenceAge};
pub use analysis::{ClassifiedAccess, PidAnalysis, PidResults, SetAnalysis};
pub use banks::{MemoryBank, MemoryMap};
pub use config::{AnalysisConfig, CacheConfig, CacheConfiguration, ReplacementPolicy};
pub use cost::miss_penalty;
pub use refs::{CoRefIter, ExhaustiveRefManager, RefIter, RefManager};
pub use state::{CacheDomain, CacheState, Line, NodeRef};
pub use stats::{Category, MissCount, Shares, Stat, Statistics};
