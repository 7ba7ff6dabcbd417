//! Natural loop detection and loop facts.
//!
//! Loops are found from back edges (`n -> h` where `h` dominates `n`); the
//! body of a loop is every block that reaches a latch without passing through
//! the header. Loops sharing a header are merged.
//!
//! Besides nesting, the forest carries the per-header facts the cache analysis
//! consumes:
//!
//! - iteration bounds ([`LoopBound`]), supplied by an external bound analysis;
//! - the enclosing header of each block;
//! - a total order over headers that extends dominance with inner headers
//!   first, used to keep symbolic address terms canonical.
//!
//! # Bound convention
//!
//! `max` is the largest number of times the header executes per entry into the
//! loop. The header's iteration counter therefore ranges over `0..max`.

use std::{
    cmp::{Ordering, Reverse},
    collections::{HashMap, HashSet},
};

use crate::utils::graph::{algorithms::DominatorTree, GraphBase, NodeId, Predecessors, Successors};

/// Iteration bounds of a loop, per entry into the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LoopBound {
    /// Smallest number of header executions, if known.
    pub min: Option<u32>,
    /// Largest number of header executions, if known.
    pub max: Option<u32>,
}

impl LoopBound {
    /// Bound with unknown minimum and maximum.
    #[must_use]
    pub const fn unknown() -> Self {
        Self { min: None, max: None }
    }

    /// Bound where minimum and maximum coincide.
    #[must_use]
    pub const fn exact(count: u32) -> Self {
        Self {
            min: Some(count),
            max: Some(count),
        }
    }

    /// Bound with a known minimum and maximum.
    #[must_use]
    pub const fn range(min: u32, max: u32) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Bound with only a known maximum.
    #[must_use]
    pub const fn at_most(max: u32) -> Self {
        Self { min: None, max: Some(max) }
    }

    /// Returns the count if minimum and maximum are known and equal.
    #[must_use]
    pub fn exact_count(&self) -> Option<u32> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min == max => Some(max),
            _ => None,
        }
    }
}

/// A natural loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// The header block (single entry point, dominates all loop nodes).
    pub header: NodeId,
    /// All blocks in the loop body, header included.
    pub body: HashSet<NodeId>,
    /// Sources of the back edges.
    pub latches: Vec<NodeId>,
    /// Nesting depth (0 = outermost).
    pub depth: usize,
    /// Header of the enclosing loop.
    pub parent: Option<NodeId>,
    /// Headers of the immediately nested loops.
    pub children: Vec<NodeId>,
    /// Iteration bounds.
    pub bound: LoopBound,
}

impl LoopInfo {
    /// Creates a loop consisting of its header only.
    #[must_use]
    pub fn new(header: NodeId) -> Self {
        let mut body = HashSet::new();
        body.insert(header);
        Self {
            header,
            body,
            latches: Vec::new(),
            depth: 0,
            parent: None,
            children: Vec::new(),
            bound: LoopBound::unknown(),
        }
    }

    /// Returns true if this loop contains the given block.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(&node)
    }

    /// Returns the number of blocks in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns true if no other loop is nested inside this one.
    #[must_use]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }
}

/// All loops of a graph with per-block membership queries.
#[derive(Debug, Clone)]
pub struct LoopForest {
    /// Loops sorted by header index.
    loops: Vec<LoopInfo>,
    /// Loop index per header block.
    header_to_loop: HashMap<NodeId, usize>,
    /// Innermost loop per block.
    block_to_loop: Vec<Option<usize>>,
    /// Dominator tree depth per block.
    dom_depth: Vec<usize>,
}

impl LoopForest {
    /// Returns all loops.
    #[must_use]
    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// Returns the number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns true if there are no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Returns the loop headed by `header`.
    #[must_use]
    pub fn loop_for_header(&self, header: NodeId) -> Option<&LoopInfo> {
        self.header_to_loop.get(&header).map(|&i| &self.loops[i])
    }

    /// Returns true if `block` heads a loop.
    #[must_use]
    pub fn is_header(&self, block: NodeId) -> bool {
        self.header_to_loop.contains_key(&block)
    }

    /// Returns the innermost loop containing `block`; a header is contained
    /// in its own loop.
    #[must_use]
    pub fn innermost_loop(&self, block: NodeId) -> Option<&LoopInfo> {
        self.block_to_loop
            .get(block.index())
            .copied()
            .flatten()
            .map(|i| &self.loops[i])
    }

    /// Returns the header of the innermost loop containing `block`, which is
    /// `block` itself for a header.
    #[must_use]
    pub fn innermost_header(&self, block: NodeId) -> Option<NodeId> {
        self.innermost_loop(block).map(|l| l.header)
    }

    /// Returns the header of the closest loop enclosing `block`, excluding
    /// the loop a header opens.
    #[must_use]
    pub fn enclosing_header(&self, block: NodeId) -> Option<NodeId> {
        let innermost = self.innermost_loop(block)?;
        if innermost.header == block {
            innermost.parent
        } else {
            Some(innermost.header)
        }
    }

    /// Returns the number of loops containing `block`.
    #[must_use]
    pub fn loop_depth(&self, block: NodeId) -> usize {
        self.innermost_loop(block).map_or(0, |l| l.depth + 1)
    }

    /// Returns the headers of the loops containing `block`, innermost first.
    pub fn headers_of(&self, block: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.innermost_header(block), move |&h| {
            self.loop_for_header(h).and_then(|l| l.parent)
        })
    }

    /// Returns the bounds of the loop headed by `header`.
    #[must_use]
    pub fn bound(&self, header: NodeId) -> LoopBound {
        self.loop_for_header(header)
            .map_or(LoopBound::unknown(), |l| l.bound)
    }

    /// Returns the maximum header execution count per entry, if known.
    #[must_use]
    pub fn max_iteration(&self, header: NodeId) -> Option<u32> {
        self.bound(header).max
    }

    /// Returns the minimum header execution count per entry, if known.
    #[must_use]
    pub fn min_iteration(&self, header: NodeId) -> Option<u32> {
        self.bound(header).min
    }

    /// Orders two headers so that a dominated header comes before the header
    /// dominating it; unrelated headers are ordered by index.
    ///
    /// Dominance among headers implies a strictly larger dominator depth for
    /// the dominated one, so sorting by decreasing depth extends dominance to
    /// a total order.
    #[must_use]
    pub fn compare_headers(&self, a: NodeId, b: NodeId) -> Ordering {
        let key = |n: NodeId| {
            (
                Reverse(self.dom_depth.get(n.index()).copied().unwrap_or(0)),
                n.index(),
            )
        };
        key(a).cmp(&key(b))
    }

    pub(crate) fn set_bound(&mut self, header: NodeId, bound: LoopBound) -> bool {
        match self.header_to_loop.get(&header) {
            Some(&i) => {
                self.loops[i].bound = bound;
                true
            }
            None => false,
        }
    }
}

/// Detects all natural loops in a graph.
///
/// # Arguments
///
/// * `graph` - Any graph implementing `GraphBase + Successors + Predecessors`
/// * `dominators` - Pre-computed dominator tree for the graph
///
/// # Returns
///
/// A [`LoopForest`] with nesting information and unknown bounds.
#[must_use]
pub fn detect_loops<G>(graph: &G, dominators: &DominatorTree) -> LoopForest
where
    G: GraphBase + Successors + Predecessors,
{
    let mut by_header: HashMap<NodeId, LoopInfo> = HashMap::new();

    for node in graph.node_ids() {
        for succ in graph.successors(node) {
            if dominators.dominates(succ, node) {
                let info = by_header
                    .entry(succ)
                    .or_insert_with(|| LoopInfo::new(succ));
                info.latches.push(node);
                expand_loop_body(graph, info, node);
            }
        }
    }

    let mut loops: Vec<LoopInfo> = by_header.into_values().collect();
    loops.sort_by_key(|l| l.header.index());
    compute_nesting(&mut loops);

    let header_to_loop: HashMap<NodeId, usize> = loops
        .iter()
        .enumerate()
        .map(|(i, l)| (l.header, i))
        .collect();

    let mut block_to_loop: Vec<Option<usize>> = vec![None; graph.node_count()];
    for (i, info) in loops.iter().enumerate() {
        for &block in &info.body {
            let slot = &mut block_to_loop[block.index()];
            match *slot {
                Some(existing) if loops[existing].depth >= info.depth => {}
                _ => *slot = Some(i),
            }
        }
    }

    let dom_depth = graph.node_ids().map(|n| dominators.depth(n)).collect();

    LoopForest {
        loops,
        header_to_loop,
        block_to_loop,
        dom_depth,
    }
}

/// Adds every block reaching `latch` without crossing the header.
fn expand_loop_body<G: Predecessors>(graph: &G, info: &mut LoopInfo, latch: NodeId) {
    let mut stack = vec![latch];
    while let Some(node) = stack.pop() {
        if info.body.insert(node) {
            stack.extend(graph.predecessors(node));
        }
    }
}

/// Links each loop to the smallest loop strictly containing its header.
fn compute_nesting(loops: &mut [LoopInfo]) {
    let count = loops.len();
    let mut parents: Vec<Option<usize>> = vec![None; count];

    for i in 0..count {
        let header = loops[i].header;
        let mut best: Option<usize> = None;
        for j in 0..count {
            if i == j || !loops[j].contains(header) || loops[j].header == header {
                continue;
            }
            match best {
                Some(b) if loops[b].size() <= loops[j].size() => {}
                _ => best = Some(j),
            }
        }
        parents[i] = best;
    }

    for i in 0..count {
        let mut depth = 0;
        let mut current = parents[i];
        while let Some(p) = current {
            depth += 1;
            current = parents[p];
        }
        loops[i].depth = depth;
        loops[i].parent = parents[i].map(|p| loops[p].header);
    }

    for i in 0..count {
        if let Some(p) = parents[i] {
            let child = loops[i].header;
            loops[p].children.push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::{algorithms::compute_dominators, DirectedGraph};

    /// entry -> outer -> inner -> inner_latch -> inner
    ///          inner -> outer_latch -> outer
    ///          outer -> exit
    fn nested() -> (DirectedGraph<(), ()>, Vec<NodeId>) {
        let mut g = DirectedGraph::new();
        let nodes: Vec<NodeId> = (0..6).map(|_| g.add_node(())).collect();
        let [entry, outer, inner, inner_latch, outer_latch, exit] =
            [nodes[0], nodes[1], nodes[2], nodes[3], nodes[4], nodes[5]];
        g.add_edge(entry, outer, ()).unwrap();
        g.add_edge(outer, inner, ()).unwrap();
        g.add_edge(inner, inner_latch, ()).unwrap();
        g.add_edge(inner_latch, inner, ()).unwrap();
        g.add_edge(inner, outer_latch, ()).unwrap();
        g.add_edge(outer_latch, outer, ()).unwrap();
        g.add_edge(outer, exit, ()).unwrap();
        (g, nodes)
    }

    #[test]
    fn test_detect_nested_loops() {
        let (g, n) = nested();
        let dom = compute_dominators(&g, n[0]);
        let forest = detect_loops(&g, &dom);

        assert_eq!(forest.len(), 2);
        assert!(forest.is_header(n[1]));
        assert!(forest.is_header(n[2]));

        let inner = forest.loop_for_header(n[2]).unwrap();
        assert_eq!(inner.parent, Some(n[1]));
        assert_eq!(inner.depth, 1);
        assert!(inner.contains(n[3]));
        assert!(!inner.contains(n[4]));
        assert!(inner.is_innermost());

        let outer = forest.loop_for_header(n[1]).unwrap();
        assert_eq!(outer.children, vec![n[2]]);
        assert!(outer.contains(n[4]));
    }

    #[test]
    fn test_enclosing_headers() {
        let (g, n) = nested();
        let dom = compute_dominators(&g, n[0]);
        let forest = detect_loops(&g, &dom);

        assert_eq!(forest.enclosing_header(n[0]), None);
        assert_eq!(forest.enclosing_header(n[1]), None);
        assert_eq!(forest.enclosing_header(n[2]), Some(n[1]));
        assert_eq!(forest.enclosing_header(n[3]), Some(n[2]));
        assert_eq!(forest.enclosing_header(n[4]), Some(n[1]));
        assert_eq!(forest.innermost_header(n[2]), Some(n[2]));

        assert_eq!(forest.loop_depth(n[0]), 0);
        assert_eq!(forest.loop_depth(n[1]), 1);
        assert_eq!(forest.loop_depth(n[3]), 2);
        assert_eq!(forest.headers_of(n[3]).collect::<Vec<_>>(), vec![n[2], n[1]]);
    }

    #[test]
    fn test_header_order_puts_inner_first() {
        let (g, n) = nested();
        let dom = compute_dominators(&g, n[0]);
        let forest = detect_loops(&g, &dom);

        assert_eq!(forest.compare_headers(n[2], n[1]), Ordering::Less);
        assert_eq!(forest.compare_headers(n[1], n[2]), Ordering::Greater);
        assert_eq!(forest.compare_headers(n[1], n[1]), Ordering::Equal);
    }

    #[test]
    fn test_bounds() {
        let (g, n) = nested();
        let dom = compute_dominators(&g, n[0]);
        let mut forest = detect_loops(&g, &dom);

        assert_eq!(forest.max_iteration(n[1]), None);
        assert!(forest.set_bound(n[1], LoopBound::exact(10)));
        assert!(!forest.set_bound(n[3], LoopBound::exact(10)));
        assert_eq!(forest.max_iteration(n[1]), Some(10));
        assert_eq!(forest.bound(n[1]).exact_count(), Some(10));
        assert_eq!(LoopBound::range(2, 5).exact_count(), None);
        assert_eq!(LoopBound::at_most(5).min, None);
    }
}
