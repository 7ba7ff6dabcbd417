//! Loop-affine symbolic addresses.
//!
//! A [`Poly`] value is either TOP (unknown), BOTTOM (unreached) or an affine
//! expression over loop iteration counters:
//!
//! ```text
//! c1*I(h1) + c2*I(h2) + ... + k
//! ```
//!
//! where `I(h)` is the iteration counter of the loop headed by `h`, ranging
//! over `0..max_iteration(h)`. Terms are kept in a canonical order (inner
//! headers first, see [`LoopForest::compare_headers`]) with no zero
//! coefficients and at most [`MAX_TERMS`] terms, so two equal expressions are
//! structurally identical.
//!
//! # Interning
//!
//! Expressions are interned in a [`PolyArena`] owned by a [`PolyDomain`]: a
//! [`Poly`] is a small `Copy` handle and equality is handle equality. The
//! arena is append-only and safe to share between threads, so per-set cache
//! analyses running in parallel can normalize references concurrently.
//!
//! # Precision
//!
//! Operations never fail. Anything that could produce a wrong coefficient
//! (overflow risk, too many terms, shifts by 31 or more, products of two
//! non-constant values) yields TOP instead. The trailing constant is an
//! address and wraps modulo 2^32.
//!
//! [`LoopForest::compare_headers`]: crate::analysis::cfg::LoopForest::compare_headers

use std::{cmp::Ordering, fmt};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{analysis::cfg::ControlFlowGraph, utils::graph::NodeId};

/// Maximum number of loop terms of an expression.
pub const MAX_TERMS: usize = 7;

/// Handle of an interned expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolyId(usize);

impl PolyId {
    /// Returns the arena index of the expression.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A symbolic address value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Poly {
    /// Unknown value.
    Top,
    /// Unreached or uninitialized value.
    Bottom,
    /// An interned affine expression.
    Expr(PolyId),
}

impl Poly {
    /// Returns true for TOP.
    #[must_use]
    pub const fn is_top(self) -> bool {
        matches!(self, Self::Top)
    }

    /// Returns true for BOTTOM.
    #[must_use]
    pub const fn is_bottom(self) -> bool {
        matches!(self, Self::Bottom)
    }
}

/// One `coef * I(header)` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Term {
    /// Coefficient, never zero.
    pub coef: i32,
    /// Loop header whose iteration counter is multiplied.
    pub header: NodeId,
}

/// An affine expression in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expr {
    terms: Box<[Term]>,
    constant: i32,
}

impl Expr {
    /// Returns the loop terms, inner headers first.
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Returns the trailing constant.
    #[must_use]
    pub const fn constant(&self) -> i32 {
        self.constant
    }

    /// Returns true if the expression has no loop terms.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Returns the coefficient of `header`, if the expression has a term for it.
    #[must_use]
    pub fn coefficient(&self, header: NodeId) -> Option<i32> {
        self.terms.iter().find(|t| t.header == header).map(|t| t.coef)
    }

    /// Evaluates the expression for the given iteration counters.
    ///
    /// Returns `None` if `counter` has no value for one of the headers.
    pub fn evaluate(&self, counter: impl Fn(NodeId) -> Option<u32>) -> Option<u32> {
        let mut value = self.constant as u32;
        for term in self.terms.iter() {
            let i = counter(term.header)?;
            value = value.wrapping_add((term.coef as u32).wrapping_mul(i));
        }
        Some(value)
    }
}

/// Append-only, thread-safe store of interned expressions.
pub struct PolyArena {
    exprs: boxcar::Vec<Expr>,
    index: DashMap<Expr, PolyId>,
}

impl PolyArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exprs: boxcar::Vec::new(),
            index: DashMap::new(),
        }
    }

    /// Interns an expression and returns its handle.
    pub fn intern(&self, expr: Expr) -> PolyId {
        if let Some(id) = self.index.get(&expr) {
            return *id;
        }
        match self.index.entry(expr) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = PolyId(self.exprs.push(entry.key().clone()));
                entry.insert(id);
                id
            }
        }
    }

    /// Returns an interned expression.
    #[must_use]
    pub fn get(&self, id: PolyId) -> &Expr {
        &self.exprs[id.0]
    }

    /// Returns the number of interned expressions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exprs.count()
    }

    /// Returns true if nothing was interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PolyArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PolyArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolyArena").field("len", &self.len()).finish()
    }
}

/// Concrete extent of a symbolic address.
///
/// `base` and `top` are the lowest and highest element addresses (both
/// inclusive); `stride` is the coefficient of the innermost loop term, 0 for
/// constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpan {
    /// Lowest address.
    pub base: u32,
    /// Highest address.
    pub top: u32,
    /// Step of the innermost loop.
    pub stride: i32,
}

/// Operations over [`Poly`] values of one control flow graph.
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::address::PolyDomain;
///
/// let polys = PolyDomain::new(&cfg);
/// let base = polys.address(0x1000);
/// let index = polys.term(4, header);
/// let element = polys.add(base, index);
/// assert_eq!(polys.display(element).to_string(), "4*I(n1) + 0x1000");
/// ```
#[derive(Debug)]
pub struct PolyDomain<'g> {
    cfg: &'g ControlFlowGraph,
    arena: PolyArena,
}

impl<'g> PolyDomain<'g> {
    /// Creates a domain with an empty arena.
    #[must_use]
    pub fn new(cfg: &'g ControlFlowGraph) -> Self {
        Self {
            cfg,
            arena: PolyArena::new(),
        }
    }

    /// Returns the graph whose loops the expressions refer to.
    #[must_use]
    pub fn cfg(&self) -> &'g ControlFlowGraph {
        self.cfg
    }

    /// Returns the expression arena.
    #[must_use]
    pub fn arena(&self) -> &PolyArena {
        &self.arena
    }

    /// Returns the expression behind a value, `None` for TOP and BOTTOM.
    #[must_use]
    pub fn expr(&self, value: Poly) -> Option<&Expr> {
        match value {
            Poly::Expr(id) => Some(self.arena.get(id)),
            Poly::Top | Poly::Bottom => None,
        }
    }

    /// Returns the loop terms of a value, empty for TOP and BOTTOM.
    #[must_use]
    pub fn terms(&self, value: Poly) -> &[Term] {
        match self.expr(value) {
            Some(expr) => expr.terms(),
            None => &[],
        }
    }

    /// Returns the header of the innermost term.
    #[must_use]
    pub fn first_header(&self, value: Poly) -> Option<NodeId> {
        self.terms(value).first().map(|t| t.header)
    }

    /// Returns true if the value is an expression without loop terms.
    #[must_use]
    pub fn is_constant(&self, value: Poly) -> bool {
        self.expr(value).is_some_and(Expr::is_constant)
    }

    /// Returns the value of a constant expression.
    #[must_use]
    pub fn constant_value(&self, value: Poly) -> Option<i32> {
        self.expr(value)
            .filter(|e| e.is_constant())
            .map(Expr::constant)
    }

    /// Returns the trailing constant of an expression.
    #[must_use]
    pub fn base(&self, value: Poly) -> Option<i32> {
        self.expr(value).map(Expr::constant)
    }

    fn intern(&self, terms: Vec<Term>, constant: i32) -> Poly {
        if terms.len() > MAX_TERMS {
            return Poly::Top;
        }
        Poly::Expr(self.arena.intern(Expr {
            terms: terms.into_boxed_slice(),
            constant,
        }))
    }

    /// Builds a constant.
    pub fn make(&self, constant: i32) -> Poly {
        self.intern(Vec::new(), constant)
    }

    /// Builds a constant address.
    pub fn address(&self, address: u32) -> Poly {
        self.make(address as i32)
    }

    /// Builds `coef * I(header)`.
    pub fn term(&self, coef: i32, header: NodeId) -> Poly {
        if coef == 0 {
            self.make(0)
        } else {
            self.intern(vec![Term { coef, header }], 0)
        }
    }

    /// Merges two term lists, adding or subtracting shared coefficients.
    fn combine(&self, a: &Expr, b: &Expr, negate: bool) -> Poly {
        let loops = self.cfg.loops();
        let mut terms = Vec::with_capacity(a.terms.len() + b.terms.len());
        let (mut i, mut j) = (0, 0);

        while i < a.terms.len() || j < b.terms.len() {
            let order = match (a.terms.get(i), b.terms.get(j)) {
                (Some(x), Some(y)) => loops.compare_headers(x.header, y.header),
                (Some(_), None) => Ordering::Less,
                _ => Ordering::Greater,
            };
            let term = match order {
                Ordering::Less => {
                    i += 1;
                    Some(a.terms[i - 1])
                }
                Ordering::Greater => {
                    j += 1;
                    let t = b.terms[j - 1];
                    if negate {
                        let Some(coef) = t.coef.checked_neg() else {
                            return Poly::Top;
                        };
                        Some(Term { coef, ..t })
                    } else {
                        Some(t)
                    }
                }
                Ordering::Equal => {
                    let (x, y) = (a.terms[i], b.terms[j]);
                    i += 1;
                    j += 1;
                    let rhs = if negate { y.coef.checked_neg() } else { Some(y.coef) };
                    let Some(coef) = rhs.and_then(|c| loosely_add(x.coef, c)) else {
                        return Poly::Top;
                    };
                    (coef != 0).then_some(Term { coef, ..x })
                }
            };
            if let Some(term) = term {
                terms.push(term);
                if terms.len() > MAX_TERMS {
                    return Poly::Top;
                }
            }
        }

        let constant = if negate {
            a.constant.wrapping_sub(b.constant)
        } else {
            a.constant.wrapping_add(b.constant)
        };
        self.intern(terms, constant)
    }

    /// `a + b`; BOTTOM is neutral, TOP absorbing.
    pub fn add(&self, a: Poly, b: Poly) -> Poly {
        match (a, b) {
            (Poly::Bottom, x) | (x, Poly::Bottom) => x,
            (Poly::Expr(x), Poly::Expr(y)) => {
                self.combine(self.arena.get(x), self.arena.get(y), false)
            }
            _ => Poly::Top,
        }
    }

    /// `a - b`; BOTTOM is neutral, TOP absorbing.
    pub fn sub(&self, a: Poly, b: Poly) -> Poly {
        match (a, b) {
            (Poly::Bottom, x) | (x, Poly::Bottom) => x,
            (Poly::Expr(x), Poly::Expr(y)) => {
                self.combine(self.arena.get(x), self.arena.get(y), true)
            }
            _ => Poly::Top,
        }
    }

    /// `a << b` for a constant shift below 31.
    pub fn shl(&self, a: Poly, b: Poly) -> Poly {
        match (a, b) {
            (Poly::Bottom, x) | (x, Poly::Bottom) => x,
            (Poly::Expr(x), Poly::Expr(_)) => {
                let shift = match self.constant_value(b) {
                    Some(s) if (0..31).contains(&s) => s as u32,
                    _ => return Poly::Top,
                };
                let expr = self.arena.get(x);
                let mut terms = Vec::with_capacity(expr.terms.len());
                for t in expr.terms.iter() {
                    let Some(coef) = loosely_shl(t.coef, shift) else {
                        return Poly::Top;
                    };
                    terms.push(Term { coef, ..*t });
                }
                self.intern(terms, expr.constant.wrapping_shl(shift))
            }
            _ => Poly::Top,
        }
    }

    /// `a * b` when one side is constant.
    pub fn mul(&self, a: Poly, b: Poly) -> Poly {
        match (a, b) {
            (Poly::Bottom, x) | (x, Poly::Bottom) => x,
            (Poly::Expr(x), Poly::Expr(_)) => {
                if let Some(k) = self.constant_value(b) {
                    self.scale(self.arena.get(x), k)
                } else if let Some(k) = self.constant_value(a) {
                    self.mul(b, self.make(k))
                } else {
                    Poly::Top
                }
            }
            _ => Poly::Top,
        }
    }

    fn scale(&self, expr: &Expr, k: i32) -> Poly {
        let mut terms = Vec::with_capacity(expr.terms.len());
        for t in expr.terms.iter() {
            let Some(coef) = loosely_mul(t.coef, k) else {
                return Poly::Top;
            };
            if coef != 0 {
                terms.push(Term { coef, ..*t });
            }
        }
        self.intern(terms, expr.constant.wrapping_mul(k))
    }

    /// `a | b` for two constants.
    pub fn or(&self, a: Poly, b: Poly) -> Poly {
        match (a, b) {
            (Poly::Bottom, x) | (x, Poly::Bottom) => x,
            _ => match (self.constant_value(a), self.constant_value(b)) {
                (Some(x), Some(y)) => self.make(x | y),
                _ => Poly::Top,
            },
        }
    }

    /// Join used away from loop headers; identical to [`exloop_join`](Self::exloop_join).
    pub fn join(&self, a: Poly, b: Poly) -> Poly {
        self.exloop_join(a, b)
    }

    /// Joins a loop entry value with a widened back-edge value.
    ///
    /// Terms of a header present on both sides must have equal coefficients;
    /// terms present on one side only are kept; constants must be equal.
    /// Anything else is TOP.
    pub fn exloop_join(&self, a: Poly, b: Poly) -> Poly {
        let (x, y) = match (a, b) {
            _ if a == b => return a,
            (Poly::Bottom, v) | (v, Poly::Bottom) => return v,
            (Poly::Expr(x), Poly::Expr(y)) => (self.arena.get(x), self.arena.get(y)),
            _ => return Poly::Top,
        };
        if x.constant != y.constant {
            return Poly::Top;
        }

        let loops = self.cfg.loops();
        let mut terms = Vec::with_capacity(x.terms.len() + y.terms.len());
        let (mut i, mut j) = (0, 0);
        while i < x.terms.len() || j < y.terms.len() {
            let order = match (x.terms.get(i), y.terms.get(j)) {
                (Some(p), Some(q)) => loops.compare_headers(p.header, q.header),
                (Some(_), None) => Ordering::Less,
                _ => Ordering::Greater,
            };
            match order {
                Ordering::Less => {
                    terms.push(x.terms[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    terms.push(y.terms[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    if x.terms[i].coef != y.terms[j].coef {
                        return Poly::Top;
                    }
                    terms.push(x.terms[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        self.intern(terms, x.constant)
    }

    /// Returns true if `set` equals `sub` or equals `sub` plus one innermost term.
    pub fn includes(&self, set: Poly, sub: Poly) -> bool {
        if set == sub {
            return true;
        }
        match (set, sub) {
            (Poly::Top, _) | (_, Poly::Bottom) => true,
            (Poly::Expr(s), Poly::Expr(u)) => {
                let (s, u) = (self.arena.get(s), self.arena.get(u));
                !s.terms.is_empty() && s.constant == u.constant && s.terms[1..] == u.terms[..]
            }
            _ => false,
        }
    }

    /// Extended widening at loop header `header`.
    ///
    /// `prev` is the value known before the last body execution and `next` the
    /// value after it. A constant difference `k` becomes a `k * I(header)`
    /// term; any other growth is TOP.
    pub fn exwiden(&self, header: NodeId, prev: Poly, next: Poly) -> Poly {
        match (prev, next) {
            (Poly::Bottom, v) | (v, Poly::Bottom) => return v,
            (Poly::Top, _) | (_, Poly::Top) => return Poly::Top,
            _ => {}
        }
        if self.includes(next, prev) {
            return next;
        }
        let Some(k) = self.constant_value(self.sub(next, prev)) else {
            return Poly::Top;
        };
        if self.expr(next).and_then(|e| e.coefficient(header)) == Some(k) {
            return prev;
        }
        if self.expr(prev).and_then(|e| e.coefficient(header)).is_some() {
            return Poly::Top;
        }
        self.add(prev, self.term(k, header))
    }

    /// Converts a value to its concrete extent using the maximum iteration
    /// counts; `None` for TOP, BOTTOM or a term whose bound is unknown.
    #[must_use]
    pub fn to_address(&self, value: Poly) -> Option<AddressSpan> {
        let expr = self.expr(value)?;
        let (mut pos, mut neg) = (0i64, 0i64);
        for t in expr.terms.iter() {
            let max = self.cfg.max_iteration(t.header)?;
            let span = i64::from(t.coef) * i64::from(max.saturating_sub(1));
            if t.coef < 0 {
                neg += span;
            } else {
                pos += span;
            }
        }
        let constant = i64::from(expr.constant);
        Some(AddressSpan {
            base: (constant + neg) as u32,
            top: (constant + pos) as u32,
            stride: expr.terms.first().map_or(0, |t| t.coef),
        })
    }

    /// Returns the greatest common divisor of the coefficients, 0 for constants.
    ///
    /// Every address a value denotes lies on the grid `base + k * step`.
    #[must_use]
    pub fn step(&self, value: Poly) -> u32 {
        self.terms(value)
            .iter()
            .fold(0, |g, t| gcd(g, t.coef.unsigned_abs()))
    }

    /// Returns true if every loop of the value has an exact bound.
    #[must_use]
    pub fn is_top_precise(&self, value: Poly) -> bool {
        self.expr(value).is_some_and(|e| {
            e.terms
                .iter()
                .all(|t| self.cfg.loops().bound(t.header).exact_count().is_some())
        })
    }

    /// Returns the number of addresses the value denotes over its iteration
    /// space, `None` if a bound is unknown.
    #[must_use]
    pub fn count(&self, value: Poly) -> Option<u64> {
        let expr = self.expr(value)?;
        expr.terms.iter().try_fold(1u64, |acc, t| {
            self.cfg
                .max_iteration(t.header)
                .map(|max| acc.saturating_mul(u64::from(max)))
        })
    }

    /// Replaces `I(header)` by a concrete counter value.
    pub fn substitute(&self, value: Poly, header: NodeId, counter: u32) -> Poly {
        let Some(expr) = self.expr(value) else {
            return value;
        };
        let Some(coef) = expr.coefficient(header) else {
            return value;
        };
        let Some(offset) = i32::try_from(counter).ok().and_then(|c| loosely_mul(coef, c)) else {
            return Poly::Top;
        };
        let terms = expr
            .terms
            .iter()
            .filter(|t| t.header != header)
            .copied()
            .collect();
        self.intern(terms, expr.constant.wrapping_add(offset))
    }

    /// Narrows a value leaving the loop headed by `header`.
    ///
    /// The counter of `header` is replaced by its last value when the bound is
    /// exact; with an inexact bound the value after the loop is unknown.
    pub fn filter(&self, header: NodeId, value: Poly) -> Poly {
        if self.expr(value).and_then(|e| e.coefficient(header)).is_none() {
            return value;
        }
        match self.cfg.loops().bound(header).exact_count() {
            Some(max) => self.substitute(value, header, max.saturating_sub(1)),
            None => Poly::Top,
        }
    }

    /// Returns the loop header an access of `value` in `block` is charged to.
    ///
    /// Constant values and TOP are relative to the innermost loop containing
    /// `block`; loop-dependent values to the outermost loop of their terms.
    #[must_use]
    pub fn relative_to(&self, block: NodeId, value: Poly) -> Option<NodeId> {
        match self.terms(value).last() {
            Some(t) => Some(t.header),
            None => self.cfg.loops().innermost_header(block),
        }
    }

    /// Total order on values: BOTTOM, then expressions by terms and constant,
    /// then TOP.
    #[must_use]
    pub fn compare(&self, a: Poly, b: Poly) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        match (a, b) {
            (Poly::Bottom, _) | (_, Poly::Top) => Ordering::Less,
            (_, Poly::Bottom) | (Poly::Top, _) => Ordering::Greater,
            (Poly::Expr(x), Poly::Expr(y)) => {
                let (x, y) = (self.arena.get(x), self.arena.get(y));
                let loops = self.cfg.loops();
                for (p, q) in x.terms.iter().zip(y.terms.iter()) {
                    let order = loops
                        .compare_headers(p.header, q.header)
                        .then(p.coef.cmp(&q.coef));
                    if order != Ordering::Equal {
                        return order;
                    }
                }
                x.terms
                    .len()
                    .cmp(&y.terms.len())
                    .then((x.constant as u32).cmp(&(y.constant as u32)))
            }
        }
    }

    /// Returns a printable view of a value.
    #[must_use]
    pub fn display(&self, value: Poly) -> PolyDisplay<'_> {
        PolyDisplay {
            arena: &self.arena,
            value,
        }
    }
}

/// Printable form of a [`Poly`]: `T`, `_` or `4*I(n3) + 0x100`.
pub struct PolyDisplay<'a> {
    arena: &'a PolyArena,
    value: Poly,
}

impl fmt::Display for PolyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Poly::Top => write!(f, "T"),
            Poly::Bottom => write!(f, "_"),
            Poly::Expr(id) => {
                let expr = self.arena.get(id);
                for t in expr.terms.iter() {
                    write!(f, "{}*I({}) + ", t.coef, t.header)?;
                }
                write!(f, "{:#x}", expr.constant as u32)
            }
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Index of the highest set bit, 0 for 0.
fn msb(value: u32) -> u32 {
    31u32.saturating_sub(value.leading_zeros())
}

/// Adds two coefficients, `None` if the sum may not be representable.
fn loosely_add(a: i32, b: i32) -> Option<i32> {
    let lost = (a < 0) == (b < 0) && msb(a.unsigned_abs()).max(msb(b.unsigned_abs())) >= 30;
    (!lost).then(|| a.wrapping_add(b))
}

/// Shifts a coefficient left, `None` if significant bits are shifted out.
fn loosely_shl(value: i32, shift: u32) -> Option<i32> {
    let rest = value >> (31 - shift);
    let lost = (value < 0 && rest != -1) || (value > 0 && rest != 0);
    (!lost).then(|| value << shift)
}

/// Multiplies two coefficients, `None` if the product may not be representable.
fn loosely_mul(a: i32, b: i32) -> Option<i32> {
    let lost = msb(a.unsigned_abs()) + msb(b.unsigned_abs()) >= 31;
    (!lost).then(|| a.wrapping_mul(b))
}
