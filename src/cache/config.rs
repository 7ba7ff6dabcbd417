//! Cache geometry and analysis configuration.
//!
//! [`CacheConfig`] describes one cache level (block size, set count,
//! associativity, replacement policy) and maps addresses to sets, tags and
//! blocks. [`CacheConfiguration`] groups the instruction and data caches of a
//! platform and enforces what the data cache analysis can handle.
//! [`AnalysisConfig`] holds the tuning knobs of the analysis itself.

use strum::{Display, EnumIter};

use crate::{analysis::dataflow::DEFAULT_MAX_VISITS, Error, Result};

/// Cache line replacement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
pub enum ReplacementPolicy {
    /// Least recently used.
    #[default]
    #[strum(serialize = "LRU")]
    Lru,
    /// First in, first out.
    #[strum(serialize = "FIFO")]
    Fifo,
    /// Tree-based pseudo-LRU.
    #[strum(serialize = "PLRU")]
    Plru,
    /// Random replacement.
    #[strum(serialize = "RANDOM")]
    Random,
}

/// Geometry of one cache.
///
/// Addresses decompose as `tag | set | offset`, with `block_bits` offset bits
/// and `set_bits` set bits.
///
/// # Examples
///
/// ```rust,ignore
/// use pidcache::cache::{CacheConfig, ReplacementPolicy};
///
/// // 4 KiB, 4-way, 16-byte lines: 64 sets
/// let cache = CacheConfig::new(4, 6, 4, ReplacementPolicy::Lru)?;
/// assert_eq!(cache.set(0x1234), 0x23);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheConfig {
    block_bits: u32,
    set_bits: u32,
    ways: u32,
    policy: ReplacementPolicy,
}

impl CacheConfig {
    /// Creates a validated cache geometry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCacheGeometry`] if the associativity is 0 or
    /// above 255, or if offset and set bits exceed the address width.
    pub fn new(block_bits: u32, set_bits: u32, ways: u32, policy: ReplacementPolicy) -> Result<Self> {
        if ways == 0 || ways > u32::from(u8::MAX) {
            return Err(Error::InvalidCacheGeometry(format!(
                "associativity {ways} outside 1..=255"
            )));
        }
        if !matches!(block_bits.checked_add(set_bits), Some(bits) if bits < 32) {
            return Err(Error::InvalidCacheGeometry(format!(
                "{block_bits} offset bits and {set_bits} set bits leave no tag"
            )));
        }
        Ok(Self {
            block_bits,
            set_bits,
            ways,
            policy,
        })
    }

    /// Returns the number of offset bits.
    #[must_use]
    pub const fn block_bits(&self) -> u32 {
        self.block_bits
    }

    /// Returns the number of set index bits.
    #[must_use]
    pub const fn set_bits(&self) -> u32 {
        self.set_bits
    }

    /// Returns the associativity.
    #[must_use]
    pub const fn ways(&self) -> u32 {
        self.ways
    }

    /// Returns the replacement policy.
    #[must_use]
    pub const fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    /// Returns the line size in bytes.
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        1 << self.block_bits
    }

    /// Returns the number of sets.
    #[must_use]
    pub const fn set_count(&self) -> u32 {
        1 << self.set_bits
    }

    /// Returns the set an address maps to.
    #[must_use]
    pub const fn set(&self, address: u32) -> u32 {
        (address >> self.block_bits) & (self.set_count() - 1)
    }

    /// Returns the tag of an address.
    #[must_use]
    pub const fn tag(&self, address: u32) -> u32 {
        address >> (self.block_bits + self.set_bits)
    }

    /// Returns the memory block number of an address.
    #[must_use]
    pub const fn block(&self, address: u32) -> u32 {
        address >> self.block_bits
    }

    /// Rounds an address down to the start of its block.
    #[must_use]
    pub const fn round(&self, address: u32) -> u32 {
        address & !(self.block_size() - 1)
    }
}

/// Caches of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheConfiguration {
    /// Instruction cache, if any.
    pub instruction: Option<CacheConfig>,
    /// Data cache, if any.
    pub data: Option<CacheConfig>,
    /// True if instructions and data share the data cache.
    pub unified: bool,
}

impl CacheConfiguration {
    /// A platform with a data cache only.
    #[must_use]
    pub fn data_only(data: CacheConfig) -> Self {
        Self {
            instruction: None,
            data: Some(data),
            unified: false,
        }
    }

    /// Separate instruction and data caches.
    #[must_use]
    pub fn split(instruction: CacheConfig, data: CacheConfig) -> Self {
        Self {
            instruction: Some(instruction),
            data: Some(data),
            unified: false,
        }
    }

    /// A single cache shared by instructions and data.
    #[must_use]
    pub fn unified(cache: CacheConfig) -> Self {
        Self {
            instruction: None,
            data: Some(cache),
            unified: true,
        }
    }

    /// Returns the data cache to analyse.
    ///
    /// # Errors
    ///
    /// - [`Error::UnifiedCache`] if the cache is unified
    /// - [`Error::MissingDataCache`] if there is no data cache
    /// - [`Error::UnsupportedPolicy`] if the data cache is not LRU
    pub fn data_cache(&self) -> Result<&CacheConfig> {
        if self.unified {
            return Err(Error::UnifiedCache);
        }
        let data = self.data.as_ref().ok_or(Error::MissingDataCache)?;
        if data.policy != ReplacementPolicy::Lru {
            return Err(Error::UnsupportedPolicy(data.policy));
        }
        Ok(data)
    }
}

/// Tuning of the data cache analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Analyse cache sets on the rayon thread pool.
    pub parallel: bool,
    /// Largest iteration space enumerated when comparing references; beyond
    /// it, answers are conservative.
    pub enumeration_cap: u64,
    /// Visit budget of each fixed-point computation.
    pub max_visits: usize,
    /// Initial stack pointer value.
    pub stack_base: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            enumeration_cap: 1_000_000,
            max_visits: DEFAULT_MAX_VISITS,
            stack_base: 0x8000_0000,
        }
    }
}

impl AnalysisConfig {
    /// Default configuration with set analyses running in parallel.
    #[must_use]
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    /// Sets the enumeration cap.
    #[must_use]
    pub fn with_enumeration_cap(mut self, cap: u64) -> Self {
        self.enumeration_cap = cap;
        self
    }

    /// Sets the fixed-point visit budget.
    #[must_use]
    pub fn with_max_visits(mut self, max_visits: usize) -> Self {
        self.max_visits = max_visits;
        self
    }

    /// Sets the initial stack pointer value.
    #[must_use]
    pub fn with_stack_base(mut self, stack_base: u32) -> Self {
        self.stack_base = stack_base;
        self
    }
}
