//! Node identifier for directed graphs.
//!
//! [`NodeId`] is a strongly-typed index into a [`DirectedGraph`](crate::utils::graph::DirectedGraph).
//! In a control-flow graph a node is a basic block, so node identifiers double
//! as stable keys for per-block analysis results.

use std::fmt;

/// A strongly-typed identifier for nodes within a directed graph.
///
/// Node IDs are assigned sequentially starting from 0 when nodes are added to
/// a graph. They are used to reference nodes when adding edges, to look up node
/// data, and to index per-node result vectors.
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::utils::graph::{DirectedGraph, NodeId};
///
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let a: NodeId = graph.add_node("A");
/// let b: NodeId = graph.add_node("B");
/// assert_ne!(a, b);
/// assert_eq!(b.index(), 1);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    ///
    /// # Arguments
    ///
    /// * `index` - The raw node index (0-based)
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_roundtrip() {
        let node = NodeId::new(7);
        assert_eq!(node.index(), 7);
        assert_eq!(usize::from(node), 7);
        assert_eq!(NodeId::from(7usize), node);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(3);
        assert_eq!(format!("{node:?}"), "NodeId(3)");
        assert_eq!(format!("{node}"), "n3");
    }

    #[test]
    fn test_node_id_ordering() {
        assert!(NodeId::new(1) < NodeId::new(2));
        let mut ids = vec![NodeId::new(4), NodeId::new(0), NodeId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![NodeId::new(0), NodeId::new(2), NodeId::new(4)]);
    }
}
