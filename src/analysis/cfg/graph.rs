//! Control flow graph with loop facts.

use std::sync::OnceLock;

use crate::{
    analysis::{
        cfg::{
            edge::CfgEdge,
            loops::{detect_loops, LoopBound, LoopForest},
        },
        sem::Instruction,
    },
    utils::graph::{
        algorithms::{self, compute_dominators, DominatorTree},
        DirectedGraph, EdgeId, GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
    Error, Result,
};

/// A basic block: straight-line instructions with a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicBlock {
    /// Address of the first instruction.
    pub address: u32,
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    /// Creates an empty block at `address`.
    #[must_use]
    pub fn new(address: u32) -> Self {
        Self {
            address,
            instructions: Vec::new(),
        }
    }

    /// Appends an instruction.
    #[must_use]
    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }
}

/// Incremental construction of a [`ControlFlowGraph`].
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::analysis::{BasicBlock, CfgBuilder, LoopBound};
///
/// let mut builder = CfgBuilder::new();
/// let entry = builder.add_block(BasicBlock::new(0x100));
/// let header = builder.add_block(BasicBlock::new(0x110));
/// let exit = builder.add_block(BasicBlock::new(0x120));
/// builder.add_edge(entry, header)?;
/// builder.add_edge(header, header)?;
/// builder.add_edge(header, exit)?;
/// builder.set_loop_bound(header, LoopBound::exact(10));
///
/// let cfg = builder.build(entry)?;
/// assert!(cfg.is_loop_header(header));
/// ```
#[derive(Debug, Default)]
pub struct CfgBuilder {
    graph: DirectedGraph<BasicBlock, ()>,
    bounds: Vec<(NodeId, LoopBound)>,
}

impl CfgBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block and returns its identifier.
    pub fn add_block(&mut self, block: BasicBlock) -> NodeId {
        self.graph.add_node(block)
    }

    /// Adds a control flow edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint is unknown.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.graph.add_edge(from, to, ()).map(|_| ())
    }

    /// Records the iteration bounds of the loop headed by `header`.
    pub fn set_loop_bound(&mut self, header: NodeId, bound: LoopBound) {
        self.bounds.push((header, bound));
    }

    /// Computes dominators and loops, classifies edges and freezes the graph.
    ///
    /// # Errors
    ///
    /// - [`Error::GraphError`] if the graph is empty or `entry` is unknown
    /// - [`Error::Malformed`] if a bound names a block that heads no loop
    pub fn build(self, entry: NodeId) -> Result<ControlFlowGraph> {
        if self.graph.node_count() == 0 {
            return Err(Error::GraphError("control flow graph has no blocks".into()));
        }
        if entry.index() >= self.graph.node_count() {
            return Err(Error::GraphError(format!(
                "entry {entry} is outside the graph ({} blocks)",
                self.graph.node_count()
            )));
        }

        let dominators = compute_dominators(&self.graph, entry);
        let mut loops = detect_loops(&self.graph, &dominators);
        for (header, bound) in self.bounds {
            if !loops.set_bound(header, bound) {
                return Err(malformed_error!(
                    "loop bound given for block {} which heads no loop",
                    header
                ));
            }
        }

        let graph = self.graph.map_edges(|_, from, to, ()| {
            let back = dominators.dominates(to, from);
            let exited: Vec<NodeId> = loops
                .headers_of(from)
                .take_while(|&h| loops.loop_for_header(h).is_some_and(|l| !l.contains(to)))
                .collect();
            let enters = loops.is_header(to);
            CfgEdge::new(from, to, back, exited, enters)
        });

        Ok(ControlFlowGraph {
            graph,
            entry,
            dominators,
            loops,
            rpo: OnceLock::new(),
        })
    }
}

/// A control flow graph of basic blocks with dominators, natural loops and
/// classified edges.
///
/// The graph is immutable once built and can be shared between threads; the
/// reverse post-order is computed lazily on first use.
#[derive(Debug)]
pub struct ControlFlowGraph {
    graph: DirectedGraph<BasicBlock, CfgEdge>,
    entry: NodeId,
    dominators: DominatorTree,
    loops: LoopForest,
    rpo: OnceLock<Vec<NodeId>>,
}

impl ControlFlowGraph {
    /// Returns the entry block.
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns a block by identifier.
    #[must_use]
    pub fn block(&self, node: NodeId) -> Option<&BasicBlock> {
        self.graph.node(node)
    }

    /// Iterates over all blocks.
    pub fn blocks(&self) -> impl Iterator<Item = (NodeId, &BasicBlock)> {
        self.graph.nodes()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns a classified edge.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&CfgEdge> {
        self.graph.edge(id)
    }

    /// Returns the edges leaving `node`.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &CfgEdge)> + '_ {
        self.graph
            .outgoing_edges(node)
            .iter()
            .filter_map(|&id| self.graph.edge(id).map(|e| (id, e)))
    }

    /// Returns the edges entering `node`.
    pub fn incoming_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &CfgEdge)> + '_ {
        self.graph
            .incoming_edges(node)
            .iter()
            .filter_map(|&id| self.graph.edge(id).map(|e| (id, e)))
    }

    /// Returns the dominator tree.
    #[must_use]
    pub fn dominators(&self) -> &DominatorTree {
        &self.dominators
    }

    /// Returns the loop forest.
    #[must_use]
    pub fn loops(&self) -> &LoopForest {
        &self.loops
    }

    /// Returns true if `node` heads a loop.
    #[must_use]
    pub fn is_loop_header(&self, node: NodeId) -> bool {
        self.loops.is_header(node)
    }

    /// Returns the header of the closest loop enclosing `node` (for a
    /// header, the loop around its own loop).
    #[must_use]
    pub fn enclosing_loop_header(&self, node: NodeId) -> Option<NodeId> {
        self.loops.enclosing_header(node)
    }

    /// Returns the maximum header execution count per loop entry.
    #[must_use]
    pub fn max_iteration(&self, header: NodeId) -> Option<u32> {
        self.loops.max_iteration(header)
    }

    /// Returns the minimum header execution count per loop entry.
    #[must_use]
    pub fn min_iteration(&self, header: NodeId) -> Option<u32> {
        self.loops.min_iteration(header)
    }

    /// Returns the blocks reachable from the entry in reverse post-order.
    pub fn reverse_postorder(&self) -> &[NodeId] {
        self.rpo
            .get_or_init(|| algorithms::reverse_postorder(&self.graph, self.entry))
    }
}

impl GraphBase for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.successors(node)
    }
}

impl Predecessors for ControlFlowGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.predecessors(node)
    }
}

impl RootedGraph for ControlFlowGraph {
    fn entry(&self) -> NodeId {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::CfgEdgeKind;

    /// entry -> outer -> inner <-> inner_latch, inner -> outer_latch -> outer, outer -> exit
    fn nested() -> (CfgBuilder, [NodeId; 6]) {
        let mut b = CfgBuilder::new();
        let ids = [0x00, 0x10, 0x20, 0x30, 0x40, 0x50].map(|a| b.add_block(BasicBlock::new(a)));
        let [entry, outer, inner, inner_latch, outer_latch, exit] = ids;
        b.add_edge(entry, outer).unwrap();
        b.add_edge(outer, inner).unwrap();
        b.add_edge(inner, inner_latch).unwrap();
        b.add_edge(inner_latch, inner).unwrap();
        b.add_edge(inner, outer_latch).unwrap();
        b.add_edge(outer_latch, outer).unwrap();
        b.add_edge(outer, exit).unwrap();
        (b, ids)
    }

    fn kind_of(cfg: &ControlFlowGraph, from: NodeId, to: NodeId) -> CfgEdge {
        cfg.outgoing_edges(from)
            .find(|(_, e)| e.target() == to)
            .map(|(_, e)| e.clone())
            .unwrap()
    }

    #[test]
    fn test_edge_classification() {
        let (b, [entry, outer, inner, inner_latch, outer_latch, exit]) = nested();
        let cfg = b.build(entry).unwrap();

        assert_eq!(kind_of(&cfg, entry, outer).kind(), CfgEdgeKind::LoopEntry);
        assert_eq!(kind_of(&cfg, outer, inner).kind(), CfgEdgeKind::LoopEntry);
        assert_eq!(kind_of(&cfg, inner, inner_latch).kind(), CfgEdgeKind::Ordinary);
        assert_eq!(kind_of(&cfg, inner_latch, inner).kind(), CfgEdgeKind::BackEdge);
        assert_eq!(kind_of(&cfg, outer_latch, outer).kind(), CfgEdgeKind::BackEdge);

        let inner_exit = kind_of(&cfg, inner, outer_latch);
        assert_eq!(inner_exit.kind(), CfgEdgeKind::LoopExit);
        assert_eq!(inner_exit.exited_loops(), &[inner]);

        let outer_exit = kind_of(&cfg, outer, exit);
        assert_eq!(outer_exit.exited_loops(), &[outer]);
    }

    #[test]
    fn test_bounds_and_headers() {
        let (mut b, [entry, outer, inner, inner_latch, ..]) = nested();
        b.set_loop_bound(outer, LoopBound::exact(4));
        b.set_loop_bound(inner, LoopBound::at_most(8));
        let cfg = b.build(entry).unwrap();

        assert!(cfg.is_loop_header(outer));
        assert!(!cfg.is_loop_header(inner_latch));
        assert_eq!(cfg.max_iteration(outer), Some(4));
        assert_eq!(cfg.min_iteration(inner), None);
        assert_eq!(cfg.enclosing_loop_header(inner), Some(outer));
        assert_eq!(cfg.reverse_postorder()[0], entry);
    }

    #[test]
    fn test_build_errors() {
        assert!(matches!(
            CfgBuilder::new().build(NodeId::new(0)),
            Err(Error::GraphError(_))
        ));

        let (b, _) = nested();
        assert!(matches!(b.build(NodeId::new(17)), Err(Error::GraphError(_))));

        let (mut b, [entry, ..]) = nested();
        b.set_loop_bound(entry, LoopBound::exact(3));
        assert!(matches!(b.build(entry), Err(Error::Malformed { .. })));
    }
}
