//! Generic directed graph infrastructure.
//!
//! This module provides the graph storage and the small trait vocabulary the
//! analysis algorithms are written against:
//!
//! - [`GraphBase`] - node count and node enumeration
//! - [`Successors`] / [`Predecessors`] - adjacency queries
//! - [`RootedGraph`] - graphs with a distinguished entry node
//!
//! [`DirectedGraph`] is the concrete adjacency-list store used by the
//! control-flow graph. Algorithms in [`algorithms`] accept any type that
//! implements the traits they need.

pub mod algorithms;
mod edge;
mod node;

pub use edge::EdgeId;
pub use node::NodeId;

use crate::{Error, Result};

/// Basic graph properties shared by every graph type.
pub trait GraphBase {
    /// Returns the number of nodes in the graph.
    fn node_count(&self) -> usize;

    /// Returns an iterator over every node identifier in index order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.node_count()).map(NodeId::new)
    }
}

/// Forward adjacency queries.
pub trait Successors: GraphBase {
    /// Returns an iterator over the successors of `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_;
}

/// Backward adjacency queries.
pub trait Predecessors: GraphBase {
    /// Returns an iterator over the predecessors of `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_;
}

/// A graph with a distinguished entry node.
pub trait RootedGraph: Successors {
    /// Returns the entry node.
    fn entry(&self) -> NodeId;
}

/// Adjacency-list directed graph with typed node and edge payloads.
///
/// Nodes and edges are stored in insertion order and never removed, so
/// [`NodeId`] and [`EdgeId`] values stay valid for the lifetime of the graph.
///
/// # Type Parameters
///
/// * `N` - Node payload
/// * `E` - Edge payload
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::utils::graph::{DirectedGraph, Successors};
///
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let a = graph.add_node("A");
/// let b = graph.add_node("B");
/// graph.add_edge(a, b, ())?;
///
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<(NodeId, NodeId, E)>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Adds a node and returns its identifier.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds an edge from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint is not a node of this graph.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, data: E) -> Result<EdgeId> {
        if from.index() >= self.nodes.len() || to.index() >= self.nodes.len() {
            return Err(Error::GraphError(format!(
                "edge {from} -> {to} references a node outside the graph ({} nodes)",
                self.nodes.len()
            )));
        }

        let id = EdgeId::new(self.edges.len());
        self.edges.push((from, to, data));
        self.outgoing[from.index()].push(id);
        self.incoming[to.index()].push(id);
        Ok(id)
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the payload of a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id.index())
    }

    /// Returns the payload of an edge.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&E> {
        self.edges.get(id.index()).map(|(_, _, data)| data)
    }

    /// Returns the `(source, target)` pair of an edge.
    #[must_use]
    pub fn edge_endpoints(&self, id: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges.get(id.index()).map(|(from, to, _)| (*from, *to))
    }

    /// Returns the identifiers of the edges leaving `node`.
    #[must_use]
    pub fn outgoing_edges(&self, node: NodeId) -> &[EdgeId] {
        self.outgoing.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Returns the identifiers of the edges entering `node`.
    #[must_use]
    pub fn incoming_edges(&self, node: NodeId) -> &[EdgeId] {
        self.incoming.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Iterates over all node payloads with their identifiers.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i), n))
    }

    /// Iterates over all edges as `(id, source, target, payload)`.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, NodeId, NodeId, &E)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, (from, to, data))| (EdgeId::new(i), *from, *to, data))
    }

    /// Rebuilds the graph with new edge payloads, keeping nodes and edge ids.
    pub fn map_edges<F, T>(self, mut f: F) -> DirectedGraph<N, T>
    where
        F: FnMut(EdgeId, NodeId, NodeId, E) -> T,
    {
        let edges = self
            .edges
            .into_iter()
            .enumerate()
            .map(|(i, (from, to, data))| (from, to, f(EdgeId::new(i), from, to, data)))
            .collect();
        DirectedGraph {
            nodes: self.nodes,
            edges,
            outgoing: self.outgoing,
            incoming: self.incoming,
        }
    }
}

impl<N, E> GraphBase for DirectedGraph<N, E> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing_edges(node)
            .iter()
            .map(|edge| self.edges[edge.index()].1)
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming_edges(node)
            .iter()
            .map(|edge| self.edges[edge.index()].0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_nodes_and_edges() {
        let mut graph: DirectedGraph<&str, u32> = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let e = graph.add_edge(a, b, 7).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge(e), Some(&7));
        assert_eq!(graph.edge_endpoints(e), Some((a, b)));
        assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
        assert_eq!(graph.predecessors(b).collect::<Vec<_>>(), vec![a]);
        assert_eq!(graph.node(b), Some(&"B"));
    }

    #[test]
    fn test_edge_to_missing_node_fails() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        assert!(matches!(
            graph.add_edge(a, NodeId::new(5), ()),
            Err(Error::GraphError(_))
        ));
    }

    #[test]
    fn test_map_edges_keeps_ids() {
        let mut graph: DirectedGraph<(), u8> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        let e = graph.add_edge(a, b, 1).unwrap();
        let mapped = graph.map_edges(|id, from, to, data| (id, from, to, u32::from(data) * 2));
        assert_eq!(mapped.edge(e), Some(&(e, a, b, 2)));
        assert_eq!(mapped.outgoing_edges(a), &[e]);
    }
}
