// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # pidcache
//!
//! Static classification of data cache accesses for worst-case execution
//! time analysis.
//!
//! `pidcache` takes the control flow graph of a program, with every
//! instruction described as a short sequence of semantic micro-operations,
//! and decides for each load and store how it behaves in a set-associative
//! LRU data cache. Addresses are tracked symbolically as affine functions of
//! the enclosing loops' iteration counters, so array walks are classified
//! element by element instead of collapsing to "unknown".
//!
//! ## Features
//!
//! - **Polynomial addresses** - `base + c1*I1 + ... + cn*In` over loop counters
//! - **Must, may and persistence ages** - always-hit, always-miss and
//!   persistent accesses in one pass
//! - **Per-set analyses** - one fixed point per cache set, optionally in
//!   parallel
//! - **Miss counts** - per access, relative to a loop header, ready for an
//!   IPET cost model
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pidcache::prelude::*;
//!
//! // r0 = 0x1000; loop 16 times { load [r0]; r0 += 4 }
//! let r0 = Reg::Machine(0);
//! let r1 = Reg::Machine(1);
//! let t0 = Reg::Temp(0);
//!
//! let mut builder = CfgBuilder::new();
//! let entry = builder.add_block(
//!     BasicBlock::new(0x100)
//!         .with_instruction(Instruction::new(0x100, vec![SemOp::SetI { dst: r0, imm: 0x1000 }])),
//! );
//! let body = builder.add_block(
//!     BasicBlock::new(0x104)
//!         .with_instruction(Instruction::new(
//!             0x104,
//!             vec![SemOp::Load { dst: r1, addr: r0, ty: MemType::Int32 }],
//!         ))
//!         .with_instruction(Instruction::new(
//!             0x108,
//!             vec![
//!                 SemOp::SetI { dst: t0, imm: 4 },
//!                 SemOp::Binary { op: BinOp::Add, dst: r0, a: r0, b: t0 },
//!             ],
//!         )),
//! );
//! let exit = builder.add_block(BasicBlock::new(0x10c));
//! builder.add_edge(entry, body)?;
//! builder.add_edge(body, body)?;
//! builder.add_edge(body, exit)?;
//! builder.set_loop_bound(body, LoopBound::exact(16));
//! let cfg = builder.build(entry)?;
//!
//! let caches = CacheConfiguration::data_only(CacheConfig::new(4, 6, 4, ReplacementPolicy::Lru)?);
//! let results = PidAnalysis::new(&cfg, &caches, &MemoryMap::flat(10)).run()?;
//! for access in results.accesses() {
//!     println!(
//!         "{:#x} {} {} misses",
//!         access.access.instruction,
//!         access.category(),
//!         access.misses
//!     );
//! }
//! println!("{}", results.statistics());
//! # Ok::<(), pidcache::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`analysis`] - Control flow graphs, loops, semantic operations and the
//!   data flow framework
//! - [`address`] - Symbolic address resolution and access extraction
//! - [`cache`] - The data cache analysis and its results
//! - [`utils`] - Graph storage and algorithms
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: degraded accesses at `warn`,
//! fixed-point progress at `debug`, solver visits at `trace`, and the final
//! classification summary at `info`. Install any logger to see them.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use pidcache::prelude::*;
///
/// let cache = CacheConfig::new(4, 6, 4, ReplacementPolicy::Lru)?;
/// assert_eq!(cache.set_count(), 64);
/// # Ok::<(), pidcache::Error>(())
/// ```
pub mod prelude;

/// Graph storage and algorithms shared by the analyses.
pub mod utils;

/// Program representation and the generic fixed-point framework.
///
/// # Key Types
///
/// - [`analysis::ControlFlowGraph`] - blocks, classified edges and the loop forest
/// - [`analysis::SemOp`] - the micro-operations instructions are described with
/// - [`analysis::DataFlowSolver`] - the worklist solver every analysis runs on
pub mod analysis;

/// Symbolic addresses of loads and stores.
///
/// # Key Types
///
/// - [`address::PolyDomain`] - the polynomial address domain
/// - [`address::AddressResolver`] - abstract interpretation of register and memory contents
/// - [`address::AccessBuilder`] - extraction of the access table
pub mod address;

/// Classification of data accesses against an LRU data cache.
///
/// # Key Types
///
/// - [`cache::PidAnalysis`] - runs the whole pipeline
/// - [`cache::PidResults`] - per-access classification and summary
/// - [`cache::CacheConfig`] - cache geometry
/// - [`cache::MemoryMap`] - memory banks and latencies
pub mod cache;

/// `pidcache` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `pidcache` Error type
///
/// Only invalid input and invalid configuration are errors; imprecision shows
/// up in the classification of the affected accesses.
///
/// # Examples
///
/// ```rust,no_run
/// use pidcache::{cache::{CacheConfig, ReplacementPolicy}, Error};
///
/// match CacheConfig::new(4, 6, 0, ReplacementPolicy::Lru) {
///     Ok(cache) => println!("{} sets", cache.set_count()),
///     Err(Error::InvalidCacheGeometry(message)) => println!("rejected: {message}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;
