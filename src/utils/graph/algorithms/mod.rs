//! Graph algorithms for program analysis.
//!
//! # Available Algorithms
//!
//! ## Traversal
//!
//! - [`postorder`] - Depth-first post-order
//! - [`reverse_postorder`] - Reverse post-order (the forward data flow order)
//!
//! ## Dominator Analysis
//!
//! - [`compute_dominators`] - Dominator tree of a rooted graph
//!
//! All algorithms are generic over the traits in [`crate::utils::graph`].

mod dominators;
mod traversal;

pub use dominators::{compute_dominators, DominatorTree};
pub use traversal::{postorder, reverse_postorder};
