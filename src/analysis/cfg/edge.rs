//! Control flow edge types.
//!
//! Every edge of a [`ControlFlowGraph`](crate::analysis::cfg::ControlFlowGraph)
//! is classified once, at construction time, from the loop forest. The cache
//! analysis applies a different state transformer per kind, so the
//! classification also records which loops an edge leaves.

use crate::utils::graph::NodeId;

/// Loop-structural classification of a control flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfgEdgeKind {
    /// Flow that neither enters, leaves, nor closes a loop.
    Ordinary,
    /// Edge from outside a loop into its header.
    LoopEntry,
    /// Edge from inside a loop back to its header.
    BackEdge,
    /// Edge leaving one or more loops.
    LoopExit,
}

impl CfgEdgeKind {
    /// Returns true for back edges.
    #[must_use]
    pub const fn is_back_edge(&self) -> bool {
        matches!(self, Self::BackEdge)
    }

    /// Returns true for loop-exit edges.
    #[must_use]
    pub const fn is_loop_exit(&self) -> bool {
        matches!(self, Self::LoopExit)
    }

    /// Returns true for loop-entry edges.
    #[must_use]
    pub const fn is_loop_entry(&self) -> bool {
        matches!(self, Self::LoopEntry)
    }
}

/// A classified control flow edge.
///
/// An edge can play several roles at once: a `continue` of an outer loop
/// taken from an inner loop is a back edge of the outer loop and an exit of
/// the inner one; a jump from the end of one loop to the header of a sibling
/// loop both leaves and enters. [`kind`](Self::kind) reports the dominant role
/// (back edge, then exit, then entry), while [`exited_loops`](Self::exited_loops)
/// and [`enters_loop`](Self::enters_loop) carry the complete picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgEdge {
    source: NodeId,
    target: NodeId,
    kind: CfgEdgeKind,
    exited: Vec<NodeId>,
    enters: bool,
}

impl CfgEdge {
    pub(crate) fn new(source: NodeId, target: NodeId, back: bool, exited: Vec<NodeId>, enters: bool) -> Self {
        let kind = if back {
            CfgEdgeKind::BackEdge
        } else if !exited.is_empty() {
            CfgEdgeKind::LoopExit
        } else if enters {
            CfgEdgeKind::LoopEntry
        } else {
            CfgEdgeKind::Ordinary
        };
        Self {
            source,
            target,
            kind,
            exited,
            enters: enters && !back,
        }
    }

    /// Returns the source block.
    #[must_use]
    pub const fn source(&self) -> NodeId {
        self.source
    }

    /// Returns the target block.
    #[must_use]
    pub const fn target(&self) -> NodeId {
        self.target
    }

    /// Returns the dominant classification.
    #[must_use]
    pub const fn kind(&self) -> CfgEdgeKind {
        self.kind
    }

    /// Returns true if the edge closes an iteration of the target's loop.
    #[must_use]
    pub const fn is_back_edge(&self) -> bool {
        self.kind.is_back_edge()
    }

    /// Headers of the loops left by this edge, innermost first.
    #[must_use]
    pub fn exited_loops(&self) -> &[NodeId] {
        &self.exited
    }

    /// Returns true if the edge enters the loop headed by its target.
    #[must_use]
    pub const fn enters_loop(&self) -> bool {
        self.enters
    }

    /// Returns the outermost loop header left by this edge, if any.
    #[must_use]
    pub fn outermost_exited(&self) -> Option<NodeId> {
        self.exited.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_precedence() {
        let a = NodeId::new(0);
        let b = NodeId::new(1);

        let ordinary = CfgEdge::new(a, b, false, Vec::new(), false);
        assert_eq!(ordinary.kind(), CfgEdgeKind::Ordinary);

        let entry = CfgEdge::new(a, b, false, Vec::new(), true);
        assert!(entry.kind().is_loop_entry());
        assert!(entry.enters_loop());

        let exit_into_header = CfgEdge::new(a, b, false, vec![NodeId::new(5)], true);
        assert!(exit_into_header.kind().is_loop_exit());
        assert!(exit_into_header.enters_loop());
        assert_eq!(exit_into_header.outermost_exited(), Some(NodeId::new(5)));

        let back = CfgEdge::new(a, b, true, vec![NodeId::new(7)], true);
        assert!(back.is_back_edge());
        assert!(!back.enters_loop());
        assert_eq!(back.exited_loops(), &[NodeId::new(7)]);
    }
}
