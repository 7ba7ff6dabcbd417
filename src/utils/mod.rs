//! Shared utilities.
//!
//! - [`graph`] - directed graph storage, graph traits and algorithms

pub mod graph;
