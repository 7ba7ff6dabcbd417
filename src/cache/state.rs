//! Per-set abstract cache state.
//!
//! The state of one cache set is BOTTOM or a list of candidate lines, sorted
//! by reference and generation and free of duplicate keys. Each line carries
//! its must age, may age and persistence levels (see [`crate::cache::age`]).
//! A line whose reference depends on loop counters stands for the element
//! touched at the current counter values.
//!
//! Lists are immutable. They live in a node arena owned by the
//! [`CacheDomain`] of one set analysis and every transfer rebuilds the list
//! from the back, reusing the nodes of an unchanged suffix. Comparisons check
//! node identity before comparing contents.

use std::cmp::Ordering;

use crate::{
    address::{
        access::Access,
        poly::{Poly, PolyDomain},
    },
    cache::{
        age::{Age, AgeDomain, MayAge, MustAge, PersistenceAge},
        config::CacheConfig,
        refs::{RefIter, RefManager},
        stats::{MissCount, Stat},
    },
    utils::graph::NodeId,
};

/// Index of a node in the arena of a [`CacheDomain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(u32);

impl NodeRef {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One candidate resident line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Referenced address, block-aligned when constant.
    pub reference: Poly,
    /// Instance counter of the reference; always 0 at present.
    pub generation: u32,
    /// Upper bound on the LRU age.
    pub must: Age,
    /// Lower bound on the LRU age.
    pub may: Age,
    /// Persistence ages, innermost loop last.
    pub persistence: Vec<Age>,
}

#[derive(Debug)]
struct Node {
    line: Line,
    next: Option<NodeRef>,
}

/// Abstract state of one cache set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Unreached.
    Bottom,
    /// Head of a line list, `None` for the empty list.
    List(Option<NodeRef>),
}

impl CacheState {
    /// The reachable state without any line.
    pub const EMPTY: CacheState = CacheState::List(None);

    fn head(self) -> Option<NodeRef> {
        match self {
            CacheState::Bottom => None,
            CacheState::List(head) => head,
        }
    }
}

/// Transfer functions of the cache state of one set.
pub struct CacheDomain<'a, 'g, R: RefManager> {
    polys: &'a PolyDomain<'g>,
    refs: &'a R,
    cache: CacheConfig,
    set: u32,
    cap: u64,
    ways: Age,
    must: MustAge,
    may: MayAge,
    pers: PersistenceAge,
    nodes: Vec<Node>,
}

impl<'a, 'g, R: RefManager> CacheDomain<'a, 'g, R> {
    /// Creates the domain of `set`; `cap` bounds the enumerated trials of an
    /// access.
    #[must_use]
    pub fn new(polys: &'a PolyDomain<'g>, refs: &'a R, cache: CacheConfig, set: u32, cap: u64) -> Self {
        let ways = Age::try_from(cache.ways()).unwrap_or(Age::MAX);
        Self {
            polys,
            refs,
            cache,
            set,
            cap,
            ways,
            must: MustAge::new(ways),
            may: MayAge::new(ways),
            pers: PersistenceAge::new(ways),
            nodes: Vec::new(),
        }
    }

    /// Returns the analysed set.
    #[must_use]
    pub const fn set(&self) -> u32 {
        self.set
    }

    /// Returns the number of nodes allocated so far.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, line: Line, next: Option<NodeRef>) -> NodeRef {
        let node = NodeRef(self.nodes.len() as u32);
        self.nodes.push(Node { line, next });
        node
    }

    fn iter(&self, state: CacheState) -> impl Iterator<Item = (NodeRef, &Line)> + '_ {
        std::iter::successors(state.head(), move |n| self.nodes[n.index()].next)
            .map(move |n| (n, &self.nodes[n.index()].line))
    }

    /// Returns the lines of a state, in list order.
    #[must_use]
    pub fn lines(&self, state: CacheState) -> Vec<Line> {
        self.iter(state).map(|(_, l)| l.clone()).collect()
    }

    /// Builds a list from its entries in order, reusing nodes whose
    /// successor is unchanged.
    fn build(&mut self, entries: Vec<(Option<NodeRef>, Line)>) -> CacheState {
        let mut next = None;
        for (kept, line) in entries.into_iter().rev() {
            next = Some(match kept {
                Some(n) if self.nodes[n.index()].next == next && self.nodes[n.index()].line == line => n,
                _ => self.alloc(line, next),
            });
        }
        CacheState::List(next)
    }

    fn compare(&self, a: &Line, b: &Line) -> Ordering {
        self.polys
            .compare(a.reference, b.reference)
            .then(a.generation.cmp(&b.generation))
    }

    /// Constant references are tracked by block.
    fn normalize(&self, reference: Poly) -> Poly {
        match self.polys.constant_value(reference) {
            Some(address) => self.polys.address(self.cache.round(address as u32)),
            None => reference,
        }
    }

    fn depth(&self, block: NodeId) -> usize {
        self.polys.cfg().loops().loop_depth(block)
    }

    /// Structural equality, identity first.
    #[must_use]
    pub fn equals(&self, a: CacheState, b: CacheState) -> bool {
        let (mut x, mut y) = match (a, b) {
            (CacheState::Bottom, CacheState::Bottom) => return true,
            (CacheState::List(x), CacheState::List(y)) => (x, y),
            _ => return false,
        };
        loop {
            match (x, y) {
                (None, None) => return true,
                (Some(p), Some(q)) if p == q => return true,
                (Some(p), Some(q)) => {
                    let (p, q) = (&self.nodes[p.index()], &self.nodes[q.index()]);
                    if p.line != q.line {
                        return false;
                    }
                    x = p.next;
                    y = q.next;
                }
                _ => return false,
            }
        }
    }

    /// Applies an access to the state.
    ///
    /// Uncached accesses and accesses that cannot touch the set leave the
    /// state alone. A TOP access may evict anything: must ages become
    /// unknown and persistence ages grow by one.
    pub fn update(&mut self, state: CacheState, access: &Access) -> CacheState {
        let reference = access.reference;
        if !access.cached || reference.is_bottom() || !self.refs.concerns(reference, self.set) {
            return state;
        }
        if reference.is_top() {
            return self.update_unknown(state);
        }

        let reference = self.normalize(reference);
        let matched = self
            .iter(state)
            .find(|(_, l)| l.reference == reference && l.generation == 0)
            .map(|(n, _)| n);

        let (mut must_use, mut may_use) = match matched.map(|n| &self.nodes[n.index()].line) {
            Some(l) if self.must.is_alive(&l.must) => (l.must, l.may),
            Some(l) => (self.ways, l.may),
            None => (self.ways, self.ways),
        };
        for (n, line) in self.iter(state) {
            if Some(n) == matched
                || !self
                    .refs
                    .may_meet(line.reference, line.generation, reference, 0)
            {
                continue;
            }
            if self.must.is_alive(&line.must) && must_use < self.ways {
                must_use = must_use.max(line.must);
            }
            may_use = may_use.min(line.may);
        }

        let fresh = Line {
            reference,
            generation: 0,
            must: self.must.init(0),
            may: self.may.init(0),
            persistence: self.pers.init(self.depth(access.block)),
        };
        let mut entries = Vec::new();
        let mut pending = matched.is_none().then_some(fresh);
        for (n, line) in self.iter(state) {
            if pending
                .as_ref()
                .is_some_and(|f| self.compare(line, f) == Ordering::Greater)
            {
                entries.extend(pending.take().map(|f| (None, f)));
            }
            let next = if Some(n) == matched {
                Line {
                    must: self.must.touch(&line.must),
                    may: self.may.touch(&line.may),
                    persistence: self.pers.touch(&line.persistence),
                    ..line.clone()
                }
            } else {
                Line {
                    must: self.must.update(&line.must, must_use),
                    may: self.may.update(&line.may, may_use),
                    persistence: self.pers.update(&line.persistence, must_use),
                    ..line.clone()
                }
            };
            entries.push((Some(n), next));
        }
        entries.extend(pending.map(|f| (None, f)));
        self.build(entries)
    }

    fn update_unknown(&mut self, state: CacheState) -> CacheState {
        let entries = self
            .iter(state)
            .map(|(n, line)| {
                let next = Line {
                    must: self.must.undef(0),
                    may: self.may.undef(0),
                    persistence: self.pers.update(&line.persistence, self.ways),
                    ..line.clone()
                };
                (Some(n), next)
            })
            .collect();
        self.build(entries)
    }

    /// Merges the states of two paths.
    ///
    /// A line known on one side only keeps its may age and persistence; its
    /// must age becomes unknown.
    pub fn join(&mut self, a: CacheState, b: CacheState) -> CacheState {
        match (a, b) {
            (CacheState::Bottom, s) | (s, CacheState::Bottom) => return s,
            _ if a == b => return a,
            _ => {}
        }
        let one_sided = |n: NodeRef, line: &Line| {
            (
                Some(n),
                Line {
                    must: self.must.undef(0),
                    ..line.clone()
                },
            )
        };
        let mut entries = Vec::new();
        {
            let mut x = self.iter(a).peekable();
            let mut y = self.iter(b).peekable();
            loop {
                let order = match (x.peek(), y.peek()) {
                    (None, None) => break,
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (Some((_, p)), Some((_, q))) => self.compare(p, q),
                };
                match order {
                    Ordering::Less => {
                        if let Some((n, line)) = x.next() {
                            entries.push(one_sided(n, line));
                        }
                    }
                    Ordering::Greater => {
                        if let Some((n, line)) = y.next() {
                            entries.push(one_sided(n, line));
                        }
                    }
                    Ordering::Equal => {
                        if let (Some((n, p)), Some((_, q))) = (x.next(), y.next()) {
                            let line = Line {
                                must: self.must.join(&p.must, &q.must),
                                may: self.may.join(&p.may, &q.may),
                                persistence: self.pers.join(&p.persistence, &q.persistence),
                                ..p.clone()
                            };
                            entries.push((Some(n), line));
                        }
                    }
                }
            }
        }
        self.build(entries)
    }

    /// Opens a persistence level on every line, for an edge entering a loop.
    pub fn enter(&mut self, state: CacheState) -> CacheState {
        let entries = self
            .iter(state)
            .map(|(n, line)| {
                let next = Line {
                    persistence: self.pers.enter(&line.persistence),
                    ..line.clone()
                };
                (Some(n), next)
            })
            .collect();
        self.build(entries)
    }

    /// Closes the persistence level of the loop headed by `header`, for an
    /// edge leaving it from block `from`.
    ///
    /// Lines whose innermost loop is `header` denote the element of the last
    /// iteration once the loop is left, and are rewritten to it when the bound
    /// is exact. Leaving from the header of a larger loop skips the rest of
    /// the body in the last iteration; a line then keeps its element only if
    /// it was touched in that iteration (its must age is alive) or if the last
    /// two iterations share a block. Other lines are dropped.
    pub fn leave(&mut self, state: CacheState, header: NodeId, from: NodeId) -> CacheState {
        if state == CacheState::Bottom {
            return state;
        }
        let loops = self.polys.cfg().loops();
        let exact = loops.bound(header).exact_count().filter(|&max| max > 0);
        let partial = from == header && loops.loop_for_header(header).is_some_and(|l| l.size() > 1);
        let mut lines: Vec<(Option<NodeRef>, Line)> = Vec::new();
        for (n, line) in self.iter(state) {
            let persistence = self.pers.leave(&line.persistence);
            if self.polys.first_header(line.reference) != Some(header) {
                lines.push((Some(n), Line { persistence, ..line.clone() }));
                continue;
            }
            let Some(max) = exact else {
                continue;
            };
            if partial
                && !self.must.is_alive(&line.must)
                && max > 1
                && !self.refs.same_blocks(line.reference, header, max - 2)
            {
                continue;
            }
            let reference = self.normalize(self.polys.substitute(line.reference, header, max - 1));
            if reference.is_top() || !self.refs.concerns(reference, self.set) {
                continue;
            }
            lines.push((
                None,
                Line {
                    reference,
                    persistence,
                    ..line.clone()
                },
            ));
        }

        lines.sort_by(|(_, a), (_, b)| self.compare(a, b));
        let mut entries: Vec<(Option<NodeRef>, Line)> = Vec::with_capacity(lines.len());
        for (n, line) in lines {
            match entries.last_mut() {
                Some((kept, prev)) if self.compare(prev, &line) == Ordering::Equal => {
                    *prev = Line {
                        must: self.must.join(&prev.must, &line.must),
                        may: self.may.join(&prev.may, &line.may),
                        persistence: self.pers.join(&prev.persistence, &line.persistence),
                        ..prev.clone()
                    };
                    *kept = None;
                }
                _ => entries.push((n, line)),
            }
        }
        self.build(entries)
    }

    /// Drops lines whose generation reached the associativity.
    pub fn back(&mut self, state: CacheState) -> CacheState {
        let ways = u32::from(self.ways);
        if self.iter(state).all(|(_, l)| l.generation < ways) {
            return state;
        }
        let entries = self
            .iter(state)
            .filter(|(_, l)| l.generation < ways)
            .map(|(n, l)| (Some(n), l.clone()))
            .collect();
        self.build(entries)
    }

    /// Classifies the trials of `access` in this set, given the state
    /// before it.
    ///
    /// Only addresses mapping to this set are trials. An iteration space that
    /// cannot be enumerated yields a single unclassified trial. A persistent
    /// line outside any loop only gives may-misses.
    #[must_use]
    pub fn count_misses(&self, state: CacheState, access: &Access) -> (Stat, MissCount) {
        let reference = self.normalize(access.reference);
        let Some(mut trials) = RefIter::new(self.polys, reference).filter(|it| it.size() <= self.cap) else {
            return (Stat::unclassified(), MissCount::Unbounded);
        };
        let in_set = |a: u32| self.cache.set(a) == self.set;
        let mut stat = Stat::default();
        let mut misses = 0u64;

        if !access.cached {
            let n = trials.filter(|&a| in_set(a)).count() as u64;
            stat.always_miss = n;
            return (stat, MissCount::Bounded(n));
        }

        let matched = self
            .iter(state)
            .find(|(_, l)| l.reference == reference && l.generation == 0)
            .map(|(_, l)| l);
        if matched.is_some_and(|l| self.must.is_alive(&l.must)) {
            stat.always_hit = trials.filter(|&a| in_set(a)).count() as u64;
            return (stat, MissCount::ZERO);
        }

        if matched.is_some_and(|l| self.pers.is_alive(&l.persistence)) {
            // outside any loop there is no repetition to amortize over
            let looped = self.depth(access.block) > 0;
            // a constant reference repeats its single trial every iteration
            let varying = !self.polys.is_constant(reference);
            let mut last = None;
            for block in trials.filter(|&a| in_set(a)).map(|a| self.cache.block(a)) {
                if !looped {
                    stat.may_miss += 1;
                } else if last.is_none() && varying {
                    stat.always_miss += 1;
                } else {
                    stat.persistent += 1;
                }
                if last != Some(block) {
                    misses += 1;
                }
                last = Some(block);
            }
            return (stat, MissCount::Bounded(misses));
        }

        let competitors: Vec<Poly> = self
            .iter(state)
            .filter(|(_, l)| {
                self.may.is_alive(&l.may)
                    && self.refs.is_compatible(l.reference, reference)
                    && self.refs.may_meet(l.reference, l.generation, reference, 0)
            })
            .map(|(_, l)| l.reference)
            .collect();
        while let Some(address) = trials.next() {
            if !in_set(address) {
                continue;
            }
            let block = self.cache.block(address);
            let present = competitors.iter().any(|&c| {
                trials
                    .apply(c)
                    .is_some_and(|other| self.cache.block(other) == block)
            });
            if present {
                stat.may_miss += 1;
            } else {
                stat.always_miss += 1;
            }
            misses += 1;
        }
        (stat, MissCount::Bounded(misses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::access::AccessKind,
        analysis::{
            cfg::{BasicBlock, CfgBuilder, ControlFlowGraph, LoopBound},
            sem::MemType,
        },
        cache::{config::ReplacementPolicy, refs::ExhaustiveRefManager},
    };

    /// entry -> header (self loop, 8 iterations) -> exit
    fn looped() -> (ControlFlowGraph, NodeId, NodeId) {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(BasicBlock::new(0));
        let header = b.add_block(BasicBlock::new(0x10));
        let exit = b.add_block(BasicBlock::new(0x20));
        b.add_edge(entry, header).unwrap();
        b.add_edge(header, header).unwrap();
        b.add_edge(header, exit).unwrap();
        b.set_loop_bound(header, LoopBound::exact(8));
        (b.build(entry).unwrap(), entry, header)
    }

    fn access(block: NodeId, reference: Poly) -> Access {
        Access {
            block,
            instruction: 0x100,
            kind: AccessKind::Load,
            reference,
            ty: MemType::Int32,
            cached: true,
            range: None,
        }
    }

    /// 2 ways, 1 set, 16-byte lines
    fn cache() -> CacheConfig {
        CacheConfig::new(4, 0, 2, ReplacementPolicy::Lru).unwrap()
    }

    #[test]
    fn test_hits_and_evictions() {
        let (cfg, entry, _) = looped();
        let polys = PolyDomain::new(&cfg);
        let refs = ExhaustiveRefManager::new(&polys, cache(), 1000);
        let mut d = CacheDomain::new(&polys, &refs, cache(), 0, 1000);

        let a = access(entry, polys.make(0x1004));
        let b = access(entry, polys.make(0x2000));
        let c = access(entry, polys.make(0x3000));

        let s0 = d.update(CacheState::Bottom, &a);
        assert_eq!(d.lines(s0).len(), 1);
        assert_eq!(d.lines(s0)[0].reference, polys.make(0x1000));
        assert_eq!(d.count_misses(s0, &a), (Stat { always_hit: 1, ..Stat::default() }, MissCount::ZERO));

        let s1 = d.update(s0, &b);
        let (stat, misses) = d.count_misses(s1, &a);
        assert_eq!(stat.always_hit, 1);
        assert_eq!(misses, MissCount::ZERO);

        // a is the oldest of three distinct lines in a 2-way set
        let s2 = d.update(s1, &c);
        let (stat, misses) = d.count_misses(s2, &a);
        assert_eq!(stat.always_hit, 0);
        assert_eq!(stat.trials(), 1);
        assert_eq!(misses, MissCount::Bounded(1));

        // hitting b again does not age a past it twice
        let s3 = d.update(s1, &b);
        let s3 = d.update(s3, &b);
        assert_eq!(d.count_misses(s3, &a).0.always_hit, 1);
    }

    #[test]
    fn test_top_access_forgets_must() {
        let (cfg, entry, header) = looped();
        let polys = PolyDomain::new(&cfg);
        let refs = ExhaustiveRefManager::new(&polys, cache(), 1000);
        let mut d = CacheDomain::new(&polys, &refs, cache(), 0, 1000);

        let a = access(entry, polys.make(0x1000));
        let s = d.update(CacheState::EMPTY, &a);
        let s = d.update(s, &access(entry, Poly::Top));
        let (stat, misses) = d.count_misses(s, &a);
        assert_eq!(stat.always_hit, 0);
        assert_eq!(stat.persistent, 0);
        assert_eq!(stat.may_miss, 1);
        assert_eq!(misses, MissCount::Bounded(1));

        // inside the loop the same line is persistent
        let a_in = access(header, polys.make(0x1000));
        let t = d.update(CacheState::EMPTY, &a_in);
        let t = d.update(t, &access(header, Poly::Top));
        let (stat, misses) = d.count_misses(t, &a_in);
        assert_eq!(stat.persistent, 1);
        assert_eq!(stat.may_miss, 0);
        assert_eq!(misses, MissCount::Bounded(1));

        // a second unknown access may have evicted the line
        let s = d.update(s, &access(entry, Poly::Top));
        let (stat, misses) = d.count_misses(s, &a);
        assert_eq!(stat.may_miss, 1);
        assert_eq!(misses, MissCount::Bounded(1));

        let mut uncached = access(entry, Poly::Top);
        uncached.cached = false;
        let before = d.update(CacheState::EMPTY, &a);
        assert_eq!(d.update(before, &uncached), before);
    }

    #[test]
    fn test_join_laws() {
        let (cfg, entry, _) = looped();
        let polys = PolyDomain::new(&cfg);
        let refs = ExhaustiveRefManager::new(&polys, cache(), 1000);
        let mut d = CacheDomain::new(&polys, &refs, cache(), 0, 1000);

        let a = access(entry, polys.make(0x1000));
        let b = access(entry, polys.make(0x2000));
        let right = d.update(CacheState::EMPTY, &a);
        let left = d.update(right, &b);

        let ab = d.join(left, right);
        let ba = d.join(right, left);
        assert!(d.equals(ab, ba));
        let same = d.join(left, left);
        assert!(d.equals(same, left));
        assert_eq!(d.join(CacheState::Bottom, right), right);
        assert!(!d.equals(CacheState::Bottom, CacheState::EMPTY));

        let lines = d.lines(ab);
        assert_eq!(lines.len(), 2);
        // a: ages 1 and 0 join to 1; b is one-sided
        assert_eq!(lines[0].must, 1);
        assert_eq!(lines[1].must, 2);
        assert_eq!(lines[1].persistence, vec![0]);

        // a hit on the youngest line changes nothing and allocates nothing
        let before = d.node_count();
        let again = d.update(left, &b);
        assert_eq!(again, left);
        assert_eq!(d.node_count(), before);
    }

    #[test]
    fn test_loop_levels_and_leave() {
        let (cfg, _, header) = looped();
        let polys = PolyDomain::new(&cfg);
        let refs = ExhaustiveRefManager::new(&polys, cache(), 1000);
        let mut d = CacheDomain::new(&polys, &refs, cache(), 0, 1000);

        // 4 words per line, 8 iterations: the last two share a line
        let words = polys.add(polys.term(4, header), polys.make(0x1000));
        let entered = d.enter(CacheState::EMPTY);
        let s = d.update(entered, &access(header, words));
        assert_eq!(d.lines(s)[0].persistence, vec![0, 0]);

        let left = d.leave(s, header, header);
        let lines = d.lines(left);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].reference, polys.make(0x1010));
        assert_eq!(lines[0].persistence, vec![0]);

        // one line per iteration: the element of the last iteration remains
        let rows = polys.add(polys.term(16, header), polys.make(0x1000));
        let s = d.update(entered, &access(header, rows));
        let left = d.leave(s, header, header);
        let lines = d.lines(left);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].reference, polys.make(0x1070));
        assert_eq!(lines[0].must, 0);
        assert_eq!(d.back(s), s);
    }

    /// entry -> header -> body -> header, header -> exit; 8 iterations
    fn while_loop() -> (ControlFlowGraph, NodeId, NodeId) {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(BasicBlock::new(0));
        let header = b.add_block(BasicBlock::new(0x10));
        let body = b.add_block(BasicBlock::new(0x20));
        let exit = b.add_block(BasicBlock::new(0x30));
        b.add_edge(entry, header).unwrap();
        b.add_edge(header, body).unwrap();
        b.add_edge(body, header).unwrap();
        b.add_edge(header, exit).unwrap();
        b.set_loop_bound(header, LoopBound::exact(8));
        (b.build(entry).unwrap(), header, body)
    }

    #[test]
    fn test_leave_from_header_skips_body() {
        let (cfg, header, body) = while_loop();
        let polys = PolyDomain::new(&cfg);
        let refs = ExhaustiveRefManager::new(&polys, cache(), 1000);
        let mut d = CacheDomain::new(&polys, &refs, cache(), 0, 1000);

        let rows = polys.add(polys.term(16, header), polys.make(0x1000));
        let words = polys.add(polys.term(4, header), polys.make(0x1000));
        let entered = d.enter(CacheState::EMPTY);

        // leaving from the body: the body ran in the last iteration
        let after_body = d.update(entered, &access(body, rows));
        let left = d.leave(after_body, header, body);
        assert_eq!(d.lines(left)[0].reference, polys.make(0x1070));

        // leaving from the header: the body last ran one iteration earlier
        let latch = d.back(after_body);
        let at_header = d.join(entered, latch);
        let left = d.leave(at_header, header, header);
        assert!(d.lines(left).is_empty());

        // unless the last two iterations share a line
        let after_body = d.update(entered, &access(body, words));
        let latch = d.back(after_body);
        let at_header = d.join(entered, latch);
        let left = d.leave(at_header, header, header);
        assert_eq!(d.lines(left)[0].reference, polys.make(0x1010));

        // a line touched by the header itself is the last element
        let touched = d.update(at_header, &access(header, rows));
        let left = d.leave(touched, header, header);
        let lines = d.lines(left);
        assert!(lines.iter().any(|l| l.reference == polys.make(0x1070) && l.must == 0));
    }

    #[test]
    fn test_persistent_array() {
        let (cfg, _, header) = looped();
        let polys = PolyDomain::new(&cfg);
        let refs = ExhaustiveRefManager::new(&polys, cache(), 1000);
        let mut d = CacheDomain::new(&polys, &refs, cache(), 0, 1000);

        let words = access(header, polys.add(polys.term(4, header), polys.make(0x1000)));
        let entered = d.enter(CacheState::EMPTY);
        let body = d.update(entered, &words);
        let latch = d.back(body);
        let at_header = d.join(entered, latch);

        let (stat, misses) = d.count_misses(at_header, &words);
        assert_eq!(stat.always_miss, 1);
        assert_eq!(stat.persistent, 7);
        assert_eq!(misses, MissCount::Bounded(2));

        // the first visit has not seen the array yet
        let (stat, misses) = d.count_misses(entered, &words);
        assert_eq!(stat.always_miss, 8);
        assert_eq!(misses, MissCount::Bounded(8));
    }
}
