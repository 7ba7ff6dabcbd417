//! Worklist-based data flow solver.
//!
//! # Algorithm
//!
//! 1. Initialize every edge state with bottom
//! 2. Add all reachable blocks to the worklist in reverse postorder
//! 3. While the worklist is non-empty:
//!    a. Remove a block from the worklist
//!    b. Compute its input from the incoming edge states
//!    c. Apply the transfer function to get the output
//!    d. Propagate the output along each outgoing edge; enqueue the target of
//!       every edge whose state changed
//!
//! Termination relies on the analysis' domain having finite height along the
//! iteration; a visit budget turns a diverging analysis into an error instead
//! of a hang.

use std::collections::VecDeque;

use log::trace;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        dataflow::framework::{AnalysisResults, DataFlowAnalysis, Incoming},
    },
    utils::graph::NodeId,
    Error, Result,
};

/// Default upper bound on block visits.
pub const DEFAULT_MAX_VISITS: usize = 1_000_000;

/// Worklist-based forward data flow solver.
///
/// # Usage
///
/// ```rust,ignore
/// use pidcache::analysis::dataflow::DataFlowSolver;
///
/// let mut solver = DataFlowSolver::new(&cfg, analysis);
/// let results = solver.solve()?;
/// let analysis = solver.into_analysis();
/// ```
pub struct DataFlowSolver<'g, A: DataFlowAnalysis> {
    /// The graph being analyzed.
    cfg: &'g ControlFlowGraph,
    /// The analysis being solved.
    analysis: A,
    /// Worklist of blocks to process.
    worklist: VecDeque<NodeId>,
    /// Whether each block is currently in the worklist.
    in_worklist: Vec<bool>,
    /// Number of block visits performed.
    iterations: usize,
    /// Visit budget.
    max_visits: usize,
}

impl<'g, A: DataFlowAnalysis> DataFlowSolver<'g, A> {
    /// Creates a new solver for the given analysis.
    #[must_use]
    pub fn new(cfg: &'g ControlFlowGraph, analysis: A) -> Self {
        Self {
            cfg,
            analysis,
            worklist: VecDeque::new(),
            in_worklist: Vec::new(),
            iterations: 0,
            max_visits: DEFAULT_MAX_VISITS,
        }
    }

    /// Sets the visit budget.
    #[must_use]
    pub fn with_max_visits(mut self, max_visits: usize) -> Self {
        self.max_visits = max_visits;
        self
    }

    /// Returns the number of block visits performed.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Consumes the solver and returns the analysis.
    pub fn into_analysis(self) -> A {
        self.analysis
    }

    /// Solves the analysis to a fixed point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IterationLimit`] if the visit budget is exhausted.
    pub fn solve(&mut self) -> Result<AnalysisResults<A::State>> {
        let cfg = self.cfg;
        let block_count = cfg.block_count();
        let bottom = self.analysis.bottom();
        let entry_state = self.analysis.entry_state();

        let mut in_states = vec![bottom.clone(); block_count];
        let mut out_states = vec![bottom.clone(); block_count];
        let mut edge_states = vec![bottom; cfg.edge_count()];

        self.iterations = 0;
        self.worklist.clear();
        self.in_worklist = vec![false; block_count];
        for &node in cfg.reverse_postorder() {
            self.worklist.push_back(node);
            self.in_worklist[node.index()] = true;
        }

        while let Some(block) = self.worklist.pop_front() {
            self.in_worklist[block.index()] = false;
            self.iterations += 1;
            if self.iterations > self.max_visits {
                return Err(Error::IterationLimit(self.max_visits));
            }
            trace!("visiting {block} (visit {})", self.iterations);

            let input = {
                let mut incoming: Vec<Incoming<'_, A::State>> = Vec::new();
                if block == cfg.entry() {
                    incoming.push(Incoming {
                        edge: None,
                        state: &entry_state,
                    });
                }
                for (id, edge) in cfg.incoming_edges(block) {
                    incoming.push(Incoming {
                        edge: Some(edge),
                        state: &edge_states[id.index()],
                    });
                }
                self.analysis.input(cfg, block, &incoming)
            };

            let output = self.analysis.transfer(cfg, block, &input);
            for (id, edge) in cfg.outgoing_edges(block) {
                let state = self.analysis.propagate(cfg, edge, &output);
                if !self.analysis.equals(&state, &edge_states[id.index()]) {
                    edge_states[id.index()] = state;
                    let target = edge.target();
                    if !self.in_worklist[target.index()] {
                        self.in_worklist[target.index()] = true;
                        self.worklist.push_back(target);
                    }
                }
            }

            in_states[block.index()] = input;
            out_states[block.index()] = output;
        }

        Ok(AnalysisResults {
            in_states,
            out_states,
            edge_states,
            iterations: self.iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::{BasicBlock, CfgBuilder, CfgEdge};

    /// Counts, per block, the largest number of loop iterations seen, capped.
    struct Depth {
        cap: u32,
    }

    impl DataFlowAnalysis for Depth {
        type State = Option<u32>;

        fn bottom(&self) -> Self::State {
            None
        }

        fn entry_state(&self) -> Self::State {
            Some(0)
        }

        fn join(&mut self, a: &Self::State, b: &Self::State) -> Self::State {
            match (a, b) {
                (None, x) | (x, None) => *x,
                (Some(x), Some(y)) => Some((*x).max(*y)),
            }
        }

        fn equals(&self, a: &Self::State, b: &Self::State) -> bool {
            a == b
        }

        fn transfer(&mut self, _: &ControlFlowGraph, _: NodeId, input: &Self::State) -> Self::State {
            *input
        }

        fn propagate(&mut self, _: &ControlFlowGraph, edge: &CfgEdge, output: &Self::State) -> Self::State {
            if edge.is_back_edge() {
                output.map(|n| (n + 1).min(self.cap))
            } else {
                *output
            }
        }
    }

    fn looping() -> (ControlFlowGraph, [NodeId; 4]) {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(BasicBlock::new(0));
        let header = b.add_block(BasicBlock::new(4));
        let dead = b.add_block(BasicBlock::new(8));
        let exit = b.add_block(BasicBlock::new(12));
        b.add_edge(entry, header).unwrap();
        b.add_edge(header, header).unwrap();
        b.add_edge(header, exit).unwrap();
        b.add_edge(dead, exit).unwrap();
        (b.build(entry).unwrap(), [entry, header, dead, exit])
    }

    #[test]
    fn test_solver_reaches_fixpoint() {
        let (cfg, [entry, header, dead, exit]) = looping();
        let mut solver = DataFlowSolver::new(&cfg, Depth { cap: 5 });
        let results = solver.solve().unwrap();

        assert_eq!(results.in_state(entry), Some(&Some(0)));
        assert_eq!(results.in_state(header), Some(&Some(5)));
        assert_eq!(results.in_state(exit), Some(&Some(5)));
        assert_eq!(results.in_state(dead), Some(&None));
        assert!(results.iterations >= 4);
    }

    #[test]
    fn test_solver_visit_budget() {
        let (cfg, _) = looping();
        let mut solver = DataFlowSolver::new(&cfg, Depth { cap: 1000 }).with_max_visits(10);
        assert!(matches!(solver.solve(), Err(Error::IterationLimit(10))));
    }
}
