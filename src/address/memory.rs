//! Abstract memory of the address resolution interpreter.
//!
//! Memory is a map from exact word addresses to symbolic values. An address
//! without a cell holds TOP; knowledge is only ever lost, so the map shrinks
//! under joins and imprecise stores. Cells are word-sized: a store removes
//! every other cell it could partially overwrite.
//!
//! The memory also remembers which bytes may have been written since the
//! entry. Bytes never written still hold their initial image contents, which
//! the interpreter uses as a fallback for loads finding no cell.

use std::collections::BTreeMap;

use crate::address::poly::{Poly, PolyDomain};

/// Bytes covered by one cell.
const WORD: u32 = 4;

/// Word-addressed map of known memory contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Memory {
    cells: BTreeMap<u32, Poly>,
    /// Written byte intervals, first byte to last byte.
    written: BTreeMap<u32, u32>,
    /// Set once a store to an unknown address happened.
    havoc: bool,
}

impl Memory {
    /// Creates a memory without any knowledge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value known at `address`, `None` when unknown.
    #[must_use]
    pub fn get(&self, address: u32) -> Option<Poly> {
        self.cells.get(&address).copied()
    }

    /// Returns the number of known cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if nothing is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates over known cells by address.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Poly)> + '_ {
        self.cells.iter().map(|(&a, &v)| (a, v))
    }

    /// Returns true if no byte of `[address, address + len)` may have been
    /// written.
    #[must_use]
    pub fn is_pristine(&self, address: u32, len: u32) -> bool {
        if self.havoc {
            return false;
        }
        let last = address.saturating_add(len.saturating_sub(1));
        !self
            .written
            .range(..=last)
            .any(|(_, &hi)| hi >= address)
    }

    fn mark_written(&mut self, lo: u32, hi: u32) {
        let hi = hi.saturating_add(WORD - 1);
        let entry = self.written.entry(lo).or_insert(hi);
        *entry = (*entry).max(hi);
    }

    /// Addresses of cells overlapping `[lo, hi]` byte-wise.
    fn overlapping(&self, lo: u32, hi: u32) -> Vec<u32> {
        let lo = lo.saturating_sub(WORD - 1);
        let hi = hi.saturating_add(WORD - 1);
        self.cells.range(lo..=hi).map(|(&a, _)| a).collect()
    }

    /// Strong update of the word at `address`.
    pub fn store(&mut self, address: u32, value: Poly) {
        for a in self.overlapping(address, address) {
            if a != address {
                self.cells.remove(&a);
            }
        }
        if value.is_top() {
            self.cells.remove(&address);
        } else {
            self.cells.insert(address, value);
        }
        self.mark_written(address, address);
    }

    /// Weak update of every word of `base + k * step` within `[base, top]`.
    ///
    /// Grid cells keep the join of their old value and `value`; every other
    /// overlapping cell is forgotten.
    pub fn store_range(&mut self, polys: &PolyDomain<'_>, base: u32, top: u32, step: u32, value: Poly) {
        if top < base {
            self.store_at_top();
            return;
        }
        self.mark_written(base, top);
        for a in self.overlapping(base, top) {
            let on_grid = step != 0 && a >= base && a <= top && (a - base) % step == 0;
            let joined = match self.cells.get(&a) {
                Some(&old) if on_grid => polys.join(old, value),
                _ => Poly::Top,
            };
            if joined.is_top() {
                self.cells.remove(&a);
            } else {
                self.cells.insert(a, joined);
            }
        }
    }

    /// A store to an unknown address: all knowledge is lost.
    pub fn store_at_top(&mut self) {
        self.cells.clear();
        self.written.clear();
        self.havoc = true;
    }

    /// Joins the values of every word of `base + k * step` within `[base, top]`.
    ///
    /// Returns TOP if a word is unknown or the grid holds more than `cap` words.
    #[must_use]
    pub fn load_range(&self, polys: &PolyDomain<'_>, base: u32, top: u32, step: u32, cap: u64) -> Poly {
        if top < base || step == 0 {
            return Poly::Top;
        }
        let count = u64::from((top - base) / step) + 1;
        if count > cap {
            return Poly::Top;
        }
        let mut result = Poly::Bottom;
        for k in 0..count {
            let address = base + (k as u32) * step;
            match self.cells.get(&address) {
                Some(&v) => result = polys.join(result, v),
                None => return Poly::Top,
            }
            if result.is_top() {
                break;
            }
        }
        result
    }

    /// Keeps the cells known on both sides, joined.
    #[must_use]
    pub fn join(&self, other: &Memory, polys: &PolyDomain<'_>) -> Memory {
        if self == other {
            return self.clone();
        }
        let cells = self
            .cells
            .iter()
            .filter_map(|(a, &v)| {
                let w = *other.cells.get(a)?;
                let j = polys.join(v, w);
                (!j.is_top()).then_some((*a, j))
            })
            .collect();
        Memory {
            cells,
            written: self.merge_written(other),
            havoc: self.havoc || other.havoc,
        }
    }

    fn merge_written(&self, other: &Memory) -> BTreeMap<u32, u32> {
        if self.havoc || other.havoc {
            return BTreeMap::new();
        }
        let mut written = self.written.clone();
        for (&lo, &hi) in &other.written {
            let entry = written.entry(lo).or_insert(hi);
            *entry = (*entry).max(hi);
        }
        written
    }

    /// Applies `f` to every cell, forgetting cells mapped to TOP.
    pub fn map(&mut self, mut f: impl FnMut(Poly) -> Poly) {
        self.cells.retain(|_, v| {
            *v = f(*v);
            !v.is_top()
        });
    }

    /// Combines two memories cell-wise with `f`; cells missing on one side
    /// are TOP on that side.
    #[must_use]
    pub fn combine(&self, other: &Memory, mut f: impl FnMut(Poly, Poly) -> Poly) -> Memory {
        let mut cells = BTreeMap::new();
        for (&a, &v) in &self.cells {
            let w = other.cells.get(&a).copied().unwrap_or(Poly::Top);
            let r = f(v, w);
            if !r.is_top() {
                cells.insert(a, r);
            }
        }
        for (&a, &w) in &other.cells {
            if !self.cells.contains_key(&a) {
                let r = f(Poly::Top, w);
                if !r.is_top() {
                    cells.insert(a, r);
                }
            }
        }
        Memory {
            cells,
            written: self.merge_written(other),
            havoc: self.havoc || other.havoc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg::{BasicBlock, CfgBuilder, ControlFlowGraph};

    fn cfg() -> ControlFlowGraph {
        let mut b = CfgBuilder::new();
        let entry = b.add_block(BasicBlock::new(0));
        b.build(entry).unwrap()
    }

    #[test]
    fn test_strong_store_and_overlap() {
        let cfg = cfg();
        let d = PolyDomain::new(&cfg);
        let mut m = Memory::new();

        m.store(0x100, d.make(1));
        m.store(0x104, d.make(2));
        assert_eq!(m.get(0x100), Some(d.make(1)));

        m.store(0x102, d.make(3));
        assert_eq!(m.get(0x100), None);
        assert_eq!(m.get(0x104), None);
        assert_eq!(m.get(0x102), Some(d.make(3)));

        m.store(0x102, Poly::Top);
        assert!(m.is_empty());
    }

    #[test]
    fn test_range_store_is_weak() {
        let cfg = cfg();
        let d = PolyDomain::new(&cfg);
        let mut m = Memory::new();
        for a in [0x100, 0x104, 0x108, 0x10c, 0x200] {
            m.store(a, d.make(7));
        }

        m.store_range(&d, 0x100, 0x108, 8, d.make(7));
        assert_eq!(m.get(0x100), Some(d.make(7)));
        assert_eq!(m.get(0x108), Some(d.make(7)));
        assert_eq!(m.get(0x104), None);
        assert_eq!(m.get(0x10c), Some(d.make(7)));
        assert_eq!(m.get(0x200), Some(d.make(7)));

        m.store_range(&d, 0x100, 0x108, 8, d.make(8));
        assert_eq!(m.get(0x100), None);

        m.store_at_top();
        assert!(m.is_empty());
    }

    #[test]
    fn test_range_load() {
        let cfg = cfg();
        let d = PolyDomain::new(&cfg);
        let mut m = Memory::new();
        m.store(0x100, d.make(5));
        m.store(0x104, d.make(5));

        assert_eq!(m.load_range(&d, 0x100, 0x104, 4, 16), d.make(5));
        assert_eq!(m.load_range(&d, 0x100, 0x108, 4, 16), Poly::Top);
        assert_eq!(m.load_range(&d, 0x100, 0x104, 4, 1), Poly::Top);

        m.store(0x104, d.make(6));
        assert_eq!(m.load_range(&d, 0x100, 0x104, 4, 16), Poly::Top);
    }

    #[test]
    fn test_written_bytes() {
        let cfg = cfg();
        let d = PolyDomain::new(&cfg);
        let mut a = Memory::new();
        assert!(a.is_pristine(0x100, 4));

        a.store(0x100, d.make(1));
        assert!(!a.is_pristine(0x100, 1));
        assert!(!a.is_pristine(0x0fe, 4));
        assert!(a.is_pristine(0x104, 4));

        let mut b = Memory::new();
        b.store_range(&d, 0x200, 0x210, 4, d.make(0));
        let j = a.join(&b, &d);
        assert!(!j.is_pristine(0x100, 4));
        assert!(!j.is_pristine(0x210, 4));
        assert!(j.is_pristine(0x300, 4));

        b.store_at_top();
        assert!(!b.is_pristine(0x300, 4));
        assert!(!a.join(&b, &d).is_pristine(0x300, 4));
    }

    #[test]
    fn test_join_keeps_common_knowledge() {
        let cfg = cfg();
        let d = PolyDomain::new(&cfg);
        let mut a = Memory::new();
        let mut b = Memory::new();
        a.store(0x100, d.make(1));
        a.store(0x200, d.make(2));
        b.store(0x100, d.make(1));
        b.store(0x200, d.make(3));
        b.store(0x300, d.make(4));

        let j = a.join(&b, &d);
        assert_eq!(j.len(), 1);
        assert_eq!(j.get(0x100), Some(d.make(1)));
        assert_eq!(j, b.join(&a, &d));
        assert_eq!(a.join(&a, &d), a);
    }
}
