//! Memory banks of the target platform.
//!
//! The analysis only asks two things of the memory layout: whether an
//! address goes through the data cache, and what a miss costs there.

use crate::Result;

/// A contiguous region of the address space with uniform timing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryBank {
    /// Bank name, for reports.
    pub name: String,
    /// First address of the bank.
    pub base: u32,
    /// Size in bytes; up to 4 GiB.
    pub size: u64,
    /// True if accesses go through the data cache.
    pub cached: bool,
    /// Cycles per read.
    pub read_latency: u32,
    /// Cycles per write.
    pub write_latency: u32,
}

impl MemoryBank {
    /// Creates a bank with equal read and write latency.
    #[must_use]
    pub fn new(name: impl Into<String>, base: u32, size: u64, cached: bool, latency: u32) -> Self {
        Self {
            name: name.into(),
            base,
            size,
            cached,
            read_latency: latency,
            write_latency: latency,
        }
    }

    /// Sets the write latency.
    #[must_use]
    pub fn with_write_latency(mut self, latency: u32) -> Self {
        self.write_latency = latency;
        self
    }

    /// Returns true if the bank holds `address`.
    #[must_use]
    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && u64::from(address - self.base) < self.size
    }

    fn end(&self) -> u64 {
        u64::from(self.base) + self.size
    }
}

/// Non-overlapping memory banks, sorted by base address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryMap {
    banks: Vec<MemoryBank>,
}

impl MemoryMap {
    /// Creates an empty map; every address is unmapped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single cached bank covering the whole address space.
    #[must_use]
    pub fn flat(latency: u32) -> Self {
        Self {
            banks: vec![MemoryBank::new("memory", 0, 1 << 32, true, latency)],
        }
    }

    /// Adds a bank.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the bank is empty, crosses the
    /// end of the address space, or overlaps a bank already present.
    pub fn with_bank(mut self, bank: MemoryBank) -> Result<Self> {
        if bank.size == 0 || bank.end() > 1 << 32 {
            return Err(malformed_error!(
                "bank {} at {:#010x} has invalid size {:#x}",
                bank.name,
                bank.base,
                bank.size
            ));
        }
        if let Some(other) = self
            .banks
            .iter()
            .find(|b| u64::from(b.base) < bank.end() && u64::from(bank.base) < b.end())
        {
            return Err(malformed_error!("bank {} overlaps bank {}", bank.name, other.name));
        }
        let at = self.banks.partition_point(|b| b.base < bank.base);
        self.banks.insert(at, bank);
        Ok(self)
    }

    /// Returns the bank holding `address`.
    #[must_use]
    pub fn bank(&self, address: u32) -> Option<&MemoryBank> {
        let at = self.banks.partition_point(|b| b.base <= address);
        self.banks[..at].last().filter(|b| b.contains(address))
    }

    /// Iterates over the banks by address.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryBank> {
        self.banks.iter()
    }

    /// Returns the largest read latency of any bank.
    #[must_use]
    pub fn worst_read_latency(&self) -> u32 {
        self.banks.iter().map(|b| b.read_latency).max().unwrap_or(0)
    }

    /// Returns the largest write latency of any bank.
    #[must_use]
    pub fn worst_write_latency(&self) -> u32 {
        self.banks.iter().map(|b| b.write_latency).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn map() -> MemoryMap {
        MemoryMap::new()
            .with_bank(MemoryBank::new("io", 0xf000_0000, 0x1000_0000, false, 20))
            .unwrap()
            .with_bank(MemoryBank::new("ram", 0x1000, 0x1000, true, 10).with_write_latency(12))
            .unwrap()
    }

    #[test]
    fn test_lookup() {
        let map = map();
        assert_eq!(map.bank(0x1000).map(|b| b.name.as_str()), Some("ram"));
        assert_eq!(map.bank(0x1fff).map(|b| b.name.as_str()), Some("ram"));
        assert!(map.bank(0x2000).is_none());
        assert!(map.bank(0x0fff).is_none());
        assert_eq!(map.bank(0xffff_ffff).map(|b| b.cached), Some(false));
        assert_eq!(map.iter().next().map(|b| b.base), Some(0x1000));
        assert_eq!(map.worst_read_latency(), 20);
        assert_eq!(map.worst_write_latency(), 20);
        assert!(MemoryMap::flat(1).bank(0xdead_beef).is_some());
    }

    #[test]
    fn test_invalid_banks() {
        let overlap = map().with_bank(MemoryBank::new("rom", 0x1800, 0x1000, true, 1));
        assert!(matches!(overlap, Err(Error::Malformed { .. })));
        let empty = MemoryMap::new().with_bank(MemoryBank::new("none", 0, 0, true, 1));
        assert!(matches!(empty, Err(Error::Malformed { .. })));
        let wrap = MemoryMap::new().with_bank(MemoryBank::new("high", 0xffff_0000, 0x2_0000, true, 1));
        assert!(matches!(wrap, Err(Error::Malformed { .. })));
    }
}
