//! Dominator tree computation.
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n`
//! passes through `d`. The **immediate dominator** of `n` is the unique strict
//! dominator of `n` that is dominated by every other strict dominator of `n`.
//! Making each node's immediate dominator its parent yields the dominator tree.
//!
//! # Algorithm
//!
//! The iterative algorithm of Cooper, Harvey and Kennedy: immediate dominators
//! are refined in reverse post-order by intersecting the dominator chains of
//! already-processed predecessors until nothing changes. On the reducible
//! graphs produced by structured code this converges in two passes.
//!
//! Nodes unreachable from the entry have no dominator and are dominated by
//! nothing.

use crate::utils::graph::{
    algorithms::traversal::reverse_postorder, NodeId, Predecessors, Successors,
};

/// Result of dominator tree computation.
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::utils::graph::{DirectedGraph, algorithms::compute_dominators};
///
/// // Diamond: entry -> {a, b} -> exit
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let entry = graph.add_node("entry");
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// let exit = graph.add_node("exit");
/// graph.add_edge(entry, a, ())?;
/// graph.add_edge(entry, b, ())?;
/// graph.add_edge(a, exit, ())?;
/// graph.add_edge(b, exit, ())?;
///
/// let dom_tree = compute_dominators(&graph, entry);
/// assert!(dom_tree.dominates(entry, exit));
/// assert!(!dom_tree.strictly_dominates(a, exit));
/// assert_eq!(dom_tree.immediate_dominator(exit), Some(entry));
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The entry (root) node of the dominator tree
    entry: NodeId,
    /// Immediate dominator for each node; the entry maps to itself,
    /// unreachable nodes map to `None`
    idom: Vec<Option<NodeId>>,
    /// Depth of each reachable node in the tree (entry = 0)
    depth: Vec<usize>,
}

impl DominatorTree {
    /// Returns the entry (root) node of the dominator tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the immediate dominator of a node, or `None` for the entry node
    /// and for unreachable nodes.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry {
            return None;
        }
        self.idom.get(node.index()).copied().flatten()
    }

    /// Returns true if `node` is reachable from the entry.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        matches!(self.idom.get(node.index()), Some(Some(_)))
    }

    /// Checks if node `a` dominates node `b`.
    ///
    /// A reachable node dominates itself. Unreachable nodes neither dominate
    /// nor are dominated.
    ///
    /// # Complexity
    ///
    /// O(depth(b) - depth(a)).
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }

        let target_depth = self.depth[a.index()];
        let mut current = b;
        while self.depth[current.index()] > target_depth {
            match self.immediate_dominator(current) {
                Some(idom) => current = idom,
                None => return false,
            }
        }
        current == a
    }

    /// Checks if node `a` strictly dominates node `b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the depth of a node in the dominator tree.
    ///
    /// The entry node has depth 0. Unreachable nodes report 0 as well.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        self.depth.get(node.index()).copied().unwrap_or(0)
    }

    /// Returns all children of a node in the dominator tree.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        (0..self.idom.len())
            .map(NodeId::new)
            .filter(|&n| n != self.entry && self.idom[n.index()] == Some(node))
            .collect()
    }

    /// Returns the number of nodes covered by the tree.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }
}

/// Computes the dominator tree of `graph` rooted at `entry`.
///
/// # Arguments
///
/// * `graph` - The graph to analyze
/// * `entry` - The root of the dominator tree
///
/// # Returns
///
/// A [`DominatorTree`] covering every node of the graph.
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let node_count = graph.node_count();
    let mut idom: Vec<Option<NodeId>> = vec![None; node_count];
    if entry.index() >= node_count {
        return DominatorTree {
            entry,
            idom,
            depth: vec![0; node_count],
        };
    }

    let order = reverse_postorder(graph, entry);
    let mut rpo_number = vec![usize::MAX; node_count];
    for (position, node) in order.iter().enumerate() {
        rpo_number[node.index()] = position;
    }

    idom[entry.index()] = Some(entry);
    let mut changed = true;
    while changed {
        changed = false;
        for &node in order.iter().skip(1) {
            let mut new_idom: Option<NodeId> = None;
            for pred in graph.predecessors(node) {
                if idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, &rpo_number, pred, current),
                });
            }
            if new_idom.is_some() && idom[node.index()] != new_idom {
                idom[node.index()] = new_idom;
                changed = true;
            }
        }
    }

    let mut depth = vec![0; node_count];
    for &node in order.iter().skip(1) {
        if let Some(parent) = idom[node.index()] {
            depth[node.index()] = depth[parent.index()] + 1;
        }
    }

    DominatorTree { entry, idom, depth }
}

/// Walks two dominator chains up to their closest common ancestor.
fn intersect(
    idom: &[Option<NodeId>],
    rpo_number: &[usize],
    mut a: NodeId,
    mut b: NodeId,
) -> NodeId {
    while a != b {
        while rpo_number[a.index()] > rpo_number[b.index()] {
            match idom[a.index()] {
                Some(next) => a = next,
                None => return b,
            }
        }
        while rpo_number[b.index()] > rpo_number[a.index()] {
            match idom[b.index()] {
                Some(next) => b = next,
                None => return a,
            }
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::DirectedGraph;

    fn diamond() -> (DirectedGraph<(), ()>, [NodeId; 4]) {
        let mut graph = DirectedGraph::new();
        let entry = graph.add_node(());
        let a = graph.add_node(());
        let b = graph.add_node(());
        let exit = graph.add_node(());
        graph.add_edge(entry, a, ()).unwrap();
        graph.add_edge(entry, b, ()).unwrap();
        graph.add_edge(a, exit, ()).unwrap();
        graph.add_edge(b, exit, ()).unwrap();
        (graph, [entry, a, b, exit])
    }

    #[test]
    fn test_diamond_dominators() {
        let (graph, [entry, a, b, exit]) = diamond();
        let tree = compute_dominators(&graph, entry);

        assert_eq!(tree.immediate_dominator(entry), None);
        assert_eq!(tree.immediate_dominator(a), Some(entry));
        assert_eq!(tree.immediate_dominator(b), Some(entry));
        assert_eq!(tree.immediate_dominator(exit), Some(entry));
        assert!(tree.dominates(entry, exit));
        assert!(tree.dominates(exit, exit));
        assert!(!tree.dominates(a, exit));
        assert_eq!(tree.depth(exit), 1);
        assert_eq!(tree.children(entry).len(), 3);
    }

    #[test]
    fn test_loop_dominators() {
        // entry -> header -> body -> header, header -> exit
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let entry = graph.add_node(());
        let header = graph.add_node(());
        let body = graph.add_node(());
        let exit = graph.add_node(());
        graph.add_edge(entry, header, ()).unwrap();
        graph.add_edge(header, body, ()).unwrap();
        graph.add_edge(body, header, ()).unwrap();
        graph.add_edge(header, exit, ()).unwrap();

        let tree = compute_dominators(&graph, entry);
        assert!(tree.dominates(header, body));
        assert!(tree.dominates(header, exit));
        assert!(tree.strictly_dominates(entry, header));
        assert!(!tree.dominates(body, header));
        assert_eq!(tree.depth(body), 2);
    }

    #[test]
    fn test_unreachable_nodes() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let entry = graph.add_node(());
        let dead = graph.add_node(());
        let tail = graph.add_node(());
        graph.add_edge(entry, tail, ()).unwrap();
        graph.add_edge(dead, tail, ()).unwrap();

        let tree = compute_dominators(&graph, entry);
        assert!(!tree.is_reachable(dead));
        assert!(!tree.dominates(dead, tail));
        assert!(!tree.dominates(entry, dead));
        assert_eq!(tree.immediate_dominator(tail), Some(entry));
    }
}
