//! Symbolic addresses of memory accesses.
//!
//! This module turns the semantic operations of a program into access records
//! whose addresses are affine functions of the enclosing loop counters:
//!
//! - [`poly`] - the address domain ([`Poly`], [`PolyDomain`])
//! - [`memory`] - abstract memory of the interpreter
//! - [`initial`] - register and memory contents at program entry
//! - [`resolve`] - the abstract interpreter and its fixed point
//! - [`access`] - extraction of one [`Access`] per load and store
//!
//! # Examples
//!
//! ```rust,ignore
//! use pidcache::address::{AccessBuilder, AddressResolver, InitialState, PolyDomain};
//!
//! let polys = PolyDomain::new(&cfg);
//! let resolver = AddressResolver::new(&polys, &init, &config);
//! let states = resolver.resolve()?;
//! let accesses = AccessBuilder::new(&resolver, &polys, &memory).build(&states)?;
//! for access in accesses.iter() {
//!     println!("{:#x}: {}", access.instruction, polys.display(access.reference));
//! }
//! ```

pub mod access;
pub mod initial;
pub mod memory;
pub mod poly;
pub mod resolve;

pub use access::{Access, AccessBuilder, AccessKind, AccessTable};
pub use initial::{InitialState, Segment};
pub use memory::Memory;
pub use poly::{AddressSpan, Expr, Poly, PolyArena, PolyDisplay, PolyDomain, PolyId, Term, MAX_TERMS};
pub use resolve::{AbstractState, AddressResolver, Interpreter, MemoryOp, ResolvedStates};
