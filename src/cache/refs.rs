//! Relations between symbolic references.
//!
//! The per-set cache state needs to know whether a reference can touch the
//! analysed set, whether two references can hit the same memory block, and
//! whether a reference stays within one block or set while a loop runs.
//! [`ExhaustiveRefManager`] answers these by a coarse interval test followed,
//! when the test is inconclusive, by enumerating the iteration space. Spaces
//! larger than the enumeration cap get the conservative answer.
//!
//! All comparisons are at memory block granularity.

use crate::{
    address::poly::{Poly, PolyDomain},
    cache::config::CacheConfig,
    utils::graph::NodeId,
};

/// Questions the cache state asks about references.
pub trait RefManager {
    /// Returns true if `reference` may access a block of `set`.
    fn concerns(&self, reference: Poly, set: u32) -> bool;

    /// Returns true if the two references may access the same block, with
    /// shared loop counters taking the same value on both sides.
    ///
    /// Equal references of equal generation always meet.
    fn may_meet(&self, a: Poly, gen_a: u32, b: Poly, gen_b: u32) -> bool;

    /// Returns the inclusive address interval of a reference, `None` if a
    /// loop bound is unknown, the reference is TOP, or its addresses wrap
    /// around the end of the address space.
    fn range(&self, reference: Poly) -> Option<(u32, u32)>;

    /// Returns true if every loop of `node` is also a loop of `access`, so
    /// both can be evaluated at the same counters.
    fn is_compatible(&self, node: Poly, access: Poly) -> bool;

    /// Returns true if the iterations `from..max` of `header` keep the
    /// reference in one cache set, whatever the other counters.
    fn same_sets(&self, reference: Poly, header: NodeId, from: u32) -> bool;

    /// Returns true if the iterations `from..max` of `header` keep the
    /// reference in one memory block, whatever the other counters.
    fn same_blocks(&self, reference: Poly, header: NodeId, from: u32) -> bool;
}

/// Mixed-radix counter over loop iteration spaces, first header fastest.
#[derive(Debug, Clone)]
struct Odometer {
    headers: Vec<NodeId>,
    bounds: Vec<u32>,
    counters: Vec<u32>,
    started: bool,
    done: bool,
}

impl Odometer {
    fn new(polys: &PolyDomain<'_>, headers: Vec<NodeId>) -> Option<Self> {
        let bounds = headers
            .iter()
            .map(|&h| polys.cfg().max_iteration(h))
            .collect::<Option<Vec<_>>>()?;
        let done = bounds.contains(&0);
        Some(Self {
            counters: vec![0; headers.len()],
            headers,
            bounds,
            started: false,
            done,
        })
    }

    fn size(&self) -> u64 {
        self.bounds
            .iter()
            .fold(1u64, |acc, &b| acc.saturating_mul(u64::from(b)))
    }

    fn counter(&self, header: NodeId) -> Option<u32> {
        let at = self.headers.iter().position(|&h| h == header)?;
        Some(self.counters[at])
    }

    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        if !self.started {
            self.started = true;
            return true;
        }
        for (counter, &bound) in self.counters.iter_mut().zip(&self.bounds) {
            *counter += 1;
            if *counter < bound {
                return true;
            }
            *counter = 0;
        }
        self.done = true;
        false
    }
}

/// Enumerates the addresses of a reference over its iteration space.
///
/// The counter of the innermost loop varies fastest.
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::cache::RefIter;
///
/// // 4*I(h) + 0x100 with h bounded to 3 iterations
/// let mut it = RefIter::new(&polys, reference).unwrap();
/// assert_eq!(it.next(), Some(0x100));
/// assert_eq!(it.next(), Some(0x104));
/// assert_eq!(it.apply(polys.term(8, h)), Some(8));
/// ```
pub struct RefIter<'p, 'g> {
    polys: &'p PolyDomain<'g>,
    reference: Poly,
    odometer: Odometer,
}

impl<'p, 'g> RefIter<'p, 'g> {
    /// Creates an iterator, `None` for TOP, BOTTOM or an unbounded loop.
    #[must_use]
    pub fn new(polys: &'p PolyDomain<'g>, reference: Poly) -> Option<Self> {
        polys.expr(reference)?;
        let headers = polys.terms(reference).iter().map(|t| t.header).collect();
        Some(Self {
            polys,
            reference,
            odometer: Odometer::new(polys, headers)?,
        })
    }

    /// Returns the size of the iteration space.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.odometer.size()
    }

    /// Returns the current counter of `header`.
    #[must_use]
    pub fn counter(&self, header: NodeId) -> Option<u32> {
        self.odometer.counter(header)
    }

    /// Evaluates another reference at the current counters.
    ///
    /// Returns `None` if `other` uses a loop this iterator does not count.
    #[must_use]
    pub fn apply(&self, other: Poly) -> Option<u32> {
        self.polys
            .expr(other)?
            .evaluate(|h| self.odometer.counter(h))
    }
}

impl Iterator for RefIter<'_, '_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if !self.odometer.advance() {
            return None;
        }
        self.apply(self.reference)
    }
}

/// Enumerates two references jointly over the union of their loops; shared
/// counters take the same value on both sides.
pub struct CoRefIter<'p, 'g> {
    polys: &'p PolyDomain<'g>,
    first: Poly,
    second: Poly,
    odometer: Odometer,
}

impl<'p, 'g> CoRefIter<'p, 'g> {
    /// Creates an iterator, `None` if either reference is TOP or BOTTOM or a
    /// loop is unbounded.
    #[must_use]
    pub fn new(polys: &'p PolyDomain<'g>, first: Poly, second: Poly) -> Option<Self> {
        polys.expr(first)?;
        polys.expr(second)?;
        let mut headers: Vec<NodeId> = polys.terms(first).iter().map(|t| t.header).collect();
        for t in polys.terms(second) {
            if !headers.contains(&t.header) {
                headers.push(t.header);
            }
        }
        Some(Self {
            polys,
            first,
            second,
            odometer: Odometer::new(polys, headers)?,
        })
    }

    /// Returns the size of the joint iteration space.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.odometer.size()
    }
}

impl Iterator for CoRefIter<'_, '_> {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<(u32, u32)> {
        if !self.odometer.advance() {
            return None;
        }
        let counter = |h| self.odometer.counter(h);
        let a = self.polys.expr(self.first)?.evaluate(counter)?;
        let b = self.polys.expr(self.second)?.evaluate(counter)?;
        Some((a, b))
    }
}

/// [`RefManager`] enumerating iteration spaces up to a cap.
pub struct ExhaustiveRefManager<'p, 'g> {
    polys: &'p PolyDomain<'g>,
    cache: CacheConfig,
    cap: u64,
}

impl<'p, 'g> ExhaustiveRefManager<'p, 'g> {
    /// Creates a manager for one cache geometry.
    #[must_use]
    pub fn new(polys: &'p PolyDomain<'g>, cache: CacheConfig, cap: u64) -> Self {
        Self { polys, cache, cap }
    }

    /// Returns the address domain.
    #[must_use]
    pub fn polys(&self) -> &'p PolyDomain<'g> {
        self.polys
    }

    /// Returns the cache geometry.
    #[must_use]
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Returns the enumeration cap.
    #[must_use]
    pub const fn cap(&self) -> u64 {
        self.cap
    }

    fn block_range(&self, reference: Poly) -> Option<(u32, u32)> {
        let (lo, hi) = self.range(reference)?;
        Some((self.cache.block(lo), self.cache.block(hi)))
    }

    /// True if no other counter moves the reference within a block of size
    /// `granule`, so its offset inside the granule is the one of the constant.
    fn aligned_apart_from(&self, reference: Poly, header: NodeId, granule: u32) -> bool {
        self.polys
            .terms(reference)
            .iter()
            .filter(|t| t.header != header)
            .all(|t| t.coef.unsigned_abs() % granule == 0)
    }

    fn stays_within(&self, reference: Poly, header: NodeId, from: u32, granule_bits: u32) -> bool {
        let Some(expr) = self.polys.expr(reference) else {
            return reference.is_bottom();
        };
        let Some(coef) = expr.coefficient(header) else {
            return true;
        };
        let Some(max) = self.polys.cfg().max_iteration(header) else {
            return false;
        };
        if from.saturating_add(1) >= max {
            return true;
        }
        if granule_bits >= 32 {
            return true;
        }
        if !self.aligned_apart_from(reference, header, 1 << granule_bits) {
            return false;
        }
        let first = (expr.constant() as u32).wrapping_add((coef as u32).wrapping_mul(from));
        let last = (expr.constant() as u32).wrapping_add((coef as u32).wrapping_mul(max - 1));
        let (lo, hi) = if coef < 0 { (last, first) } else { (first, last) };
        hi >= lo && lo >> granule_bits == hi >> granule_bits
    }
}

impl RefManager for ExhaustiveRefManager<'_, '_> {
    fn concerns(&self, reference: Poly, set: u32) -> bool {
        match reference {
            Poly::Top => return true,
            Poly::Bottom => return false,
            Poly::Expr(_) => {}
        }
        let sets = self.cache.set_count();
        let Some((lo, hi)) = self.block_range(reference) else {
            return true;
        };
        if u64::from(hi - lo) + 1 < u64::from(sets) {
            let (first, last) = (lo & (sets - 1), hi & (sets - 1));
            let inside = if first <= last {
                (first..=last).contains(&set)
            } else {
                set >= first || set <= last
            };
            if !inside {
                return false;
            }
        }
        if self
            .polys
            .terms(reference)
            .iter()
            .all(|t| self.same_sets(reference, t.header, 0))
        {
            return self.cache.set(lo << self.cache.block_bits()) == set;
        }
        match RefIter::new(self.polys, reference) {
            Some(mut it) if it.size() <= self.cap => it.any(|a| self.cache.set(a) == set),
            _ => true,
        }
    }

    fn may_meet(&self, a: Poly, gen_a: u32, b: Poly, gen_b: u32) -> bool {
        if a == b && gen_a == gen_b {
            return true;
        }
        if a.is_bottom() || b.is_bottom() {
            return false;
        }
        let (Some((alo, ahi)), Some((blo, bhi))) = (self.block_range(a), self.block_range(b)) else {
            return true;
        };
        if ahi < blo || bhi < alo {
            return false;
        }
        match CoRefIter::new(self.polys, a, b) {
            Some(mut it) if it.size() <= self.cap => {
                it.any(|(x, y)| self.cache.block(x) == self.cache.block(y))
            }
            _ => true,
        }
    }

    fn range(&self, reference: Poly) -> Option<(u32, u32)> {
        let span = self.polys.to_address(reference)?;
        // a span crossing the end of the address space is no interval
        (span.top >= span.base).then_some((span.base, span.top))
    }

    fn is_compatible(&self, node: Poly, access: Poly) -> bool {
        let loops = self.polys.terms(access);
        self.polys
            .terms(node)
            .iter()
            .all(|t| loops.iter().any(|u| u.header == t.header))
    }

    fn same_sets(&self, reference: Poly, header: NodeId, from: u32) -> bool {
        let way_span = self.cache.block_bits() + self.cache.set_bits();
        if let Some(coef) = self.polys.expr(reference).and_then(|e| e.coefficient(header)) {
            if way_span < 32 && coef.unsigned_abs() % (1 << way_span) == 0 {
                return true;
            }
        }
        self.stays_within(reference, header, from, self.cache.block_bits())
    }

    fn same_blocks(&self, reference: Poly, header: NodeId, from: u32) -> bool {
        self.stays_within(reference, header, from, self.cache.block_bits())
    }
}
