//! Data flow analysis contract.
//!
//! An analysis implements [`DataFlowAnalysis`] and is driven to a fixed point by
//! [`DataFlowSolver`](crate::analysis::dataflow::DataFlowSolver). States are
//! kept per control-flow edge rather than per block, so the analysis can apply
//! a different transformer to each edge kind (loop entry, loop exit, back edge)
//! and can tell back edges apart when computing a block's input.

use std::fmt::Debug;

use crate::{
    analysis::cfg::{CfgEdge, ControlFlowGraph},
    utils::graph::NodeId,
};

/// One incoming state of a block.
#[derive(Debug, Clone, Copy)]
pub struct Incoming<'a, S> {
    /// The edge carrying the state, or `None` for the virtual edge feeding the
    /// entry block with [`DataFlowAnalysis::entry_state`].
    pub edge: Option<&'a CfgEdge>,
    /// The state on that edge.
    pub state: &'a S,
}

impl<S> Incoming<'_, S> {
    /// Returns true if the state arrives over a back edge.
    #[must_use]
    pub fn is_back_edge(&self) -> bool {
        self.edge.is_some_and(CfgEdge::is_back_edge)
    }
}

/// A forward data flow analysis over a [`ControlFlowGraph`].
///
/// Domain operations take `&mut self` because states may live in storage owned
/// by the analysis (interned values, node arenas).
///
/// # Example
///
/// ```rust,ignore
/// use pidcache::analysis::dataflow::{DataFlowAnalysis, DataFlowSolver};
///
/// let mut solver = DataFlowSolver::new(&cfg, MyAnalysis::new());
/// let results = solver.solve()?;
/// let state = results.in_state(block);
/// ```
pub trait DataFlowAnalysis {
    /// Abstract state attached to program points.
    type State: Clone + Debug;

    /// The state of unreached program points.
    fn bottom(&self) -> Self::State;

    /// The state flowing into the entry block.
    fn entry_state(&self) -> Self::State;

    /// Least upper bound of two states.
    fn join(&mut self, a: &Self::State, b: &Self::State) -> Self::State;

    /// State equality, used to detect the fixed point.
    fn equals(&self, a: &Self::State, b: &Self::State) -> bool;

    /// Computes the input state of `block` from its incoming edge states.
    ///
    /// The default joins every incoming state. Analyses override this to treat
    /// loop headers specially.
    fn input(
        &mut self,
        _cfg: &ControlFlowGraph,
        _block: NodeId,
        incoming: &[Incoming<'_, Self::State>],
    ) -> Self::State {
        let mut acc = self.bottom();
        for inc in incoming {
            acc = self.join(&acc, inc.state);
        }
        acc
    }

    /// Applies the effect of `block` to its input state.
    fn transfer(
        &mut self,
        cfg: &ControlFlowGraph,
        block: NodeId,
        input: &Self::State,
    ) -> Self::State;

    /// Transforms the output state of a block for one outgoing edge.
    ///
    /// The default passes the state through unchanged.
    fn propagate(
        &mut self,
        _cfg: &ControlFlowGraph,
        _edge: &CfgEdge,
        output: &Self::State,
    ) -> Self::State {
        output.clone()
    }
}

/// Fixed-point states of a data flow analysis.
#[derive(Debug, Clone)]
pub struct AnalysisResults<S> {
    /// Input state for each block; unreachable blocks hold bottom.
    pub in_states: Vec<S>,
    /// Output state for each block; unreachable blocks hold bottom.
    pub out_states: Vec<S>,
    /// State on each edge, after propagation.
    pub edge_states: Vec<S>,
    /// Number of block visits until the fixed point.
    pub iterations: usize,
}

impl<S> AnalysisResults<S> {
    /// Returns the input state of a block.
    #[must_use]
    pub fn in_state(&self, block: NodeId) -> Option<&S> {
        self.in_states.get(block.index())
    }
}
