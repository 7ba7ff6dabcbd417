//! Depth-first traversal orders.
//!
//! Both functions return collected vectors since the order requires a full
//! traversal anyway. Nodes unreachable from the start node are not visited.

use crate::utils::graph::{NodeId, Successors};

/// Computes the depth-first post-order of nodes reachable from `start`.
///
/// Successors are explored in adjacency order.
///
/// # Arguments
///
/// * `graph` - The graph to traverse
/// * `start` - The starting node for traversal
///
/// # Returns
///
/// A vector of `NodeId` in post-order, or an empty vector if `start` is not a
/// node of the graph.
#[allow(clippy::items_after_statements)]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    let mut visited = vec![false; node_count];
    let mut result = Vec::with_capacity(node_count);

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut stack = vec![(start, State::Enter)];
    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if visited[node.index()] {
                    continue;
                }
                visited[node.index()] = true;
                stack.push((node, State::Exit));

                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if !visited[succ.index()] {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => result.push(node),
        }
    }

    result
}

/// Computes the reverse post-order of nodes reachable from `start`.
///
/// In reverse post-order a node precedes all of its successors except along
/// back edges, which makes it the preferred visiting order for forward data
/// flow analysis.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use crate::utils::graph::{
        algorithms::traversal::{postorder, reverse_postorder},
        DirectedGraph, NodeId,
    };

    fn create_diamond_graph() -> DirectedGraph<&'static str, ()> {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let c = graph.add_node("C");
        let d = graph.add_node("D");
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(a, c, ()).unwrap();
        graph.add_edge(b, d, ()).unwrap();
        graph.add_edge(c, d, ()).unwrap();
        graph
    }

    #[test]
    fn test_postorder_linear() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        let c = graph.add_node(());
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(b, c, ()).unwrap();

        assert_eq!(postorder(&graph, a), vec![c, b, a]);
        assert_eq!(reverse_postorder(&graph, a), vec![a, b, c]);
    }

    #[test]
    fn test_reverse_postorder_diamond() {
        let graph = create_diamond_graph();
        let order = reverse_postorder(&graph, NodeId::new(0));

        assert_eq!(order.len(), 4);
        assert_eq!(order[0], NodeId::new(0));
        assert_eq!(order[3], NodeId::new(3));
    }

    #[test]
    fn test_postorder_with_cycle_terminates() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(b, a, ()).unwrap();

        assert_eq!(postorder(&graph, a), vec![b, a]);
    }

    #[test]
    fn test_postorder_invalid_start() {
        let graph = create_diamond_graph();
        assert!(postorder(&graph, NodeId::new(42)).is_empty());
    }
}
