//! Classification counters and miss counts.

use std::{fmt, ops::Add};

use strum::{Display, EnumIter};

/// Outcome class of an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum Category {
    /// Some execution could not be classified; charge the worst case.
    #[strum(serialize = "NC")]
    NotClassified,
    /// Every execution hits.
    #[strum(serialize = "AH")]
    AlwaysHit,
    /// Misses at most once per line and loop entry.
    #[strum(serialize = "PE")]
    Persistent,
    /// Some execution may hit.
    #[strum(serialize = "MM")]
    MayMiss,
    /// Every execution misses.
    #[strum(serialize = "AM")]
    AlwaysMiss,
}

/// Per-trial outcome counters of one access.
///
/// A trial is one concrete address of the access's iteration space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Trials that always hit.
    pub always_hit: u64,
    /// Trials that always miss.
    pub always_miss: u64,
    /// Trials that may hit or miss.
    pub may_miss: u64,
    /// Trials hitting after the first load of their line in the loop.
    pub persistent: u64,
    /// Trials that could not be classified.
    pub not_classified: u64,
}

impl Stat {
    /// A single unclassified trial.
    #[must_use]
    pub const fn unclassified() -> Self {
        Self {
            always_hit: 0,
            always_miss: 0,
            may_miss: 0,
            persistent: 0,
            not_classified: 1,
        }
    }

    /// Returns the number of trials.
    #[must_use]
    pub const fn trials(&self) -> u64 {
        self.always_hit + self.always_miss + self.may_miss + self.persistent + self.not_classified
    }

    /// Returns the class of the access.
    #[must_use]
    pub const fn category(&self) -> Category {
        if self.not_classified > 0 {
            Category::NotClassified
        } else if self.always_hit == self.trials() && self.always_hit > 0 {
            Category::AlwaysHit
        } else if self.persistent > 0 {
            Category::Persistent
        } else if self.may_miss > 0 {
            Category::MayMiss
        } else {
            Category::AlwaysMiss
        }
    }

    /// Returns the share of each outcome, in [`Category`] order.
    fn fractions(&self) -> [f64; 5] {
        let n = self.trials() as f64;
        if n == 0.0 {
            return [0.0; 5];
        }
        [
            self.not_classified as f64 / n,
            self.always_hit as f64 / n,
            self.persistent as f64 / n,
            self.may_miss as f64 / n,
            self.always_miss as f64 / n,
        ]
    }
}

impl Add for Stat {
    type Output = Stat;

    fn add(self, other: Stat) -> Stat {
        Stat {
            always_hit: self.always_hit + other.always_hit,
            always_miss: self.always_miss + other.always_miss,
            may_miss: self.may_miss + other.may_miss,
            persistent: self.persistent + other.persistent,
            not_classified: self.not_classified + other.not_classified,
        }
    }
}

/// Number of misses an access contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MissCount {
    /// At most this many misses.
    Bounded(u64),
    /// No bound could be proven.
    Unbounded,
}

impl MissCount {
    /// No misses.
    pub const ZERO: MissCount = MissCount::Bounded(0);

    /// Returns the bound, `None` if unbounded.
    #[must_use]
    pub const fn bound(self) -> Option<u64> {
        match self {
            MissCount::Bounded(n) => Some(n),
            MissCount::Unbounded => None,
        }
    }
}

impl Default for MissCount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for MissCount {
    type Output = MissCount;

    fn add(self, other: MissCount) -> MissCount {
        match (self, other) {
            (MissCount::Bounded(a), MissCount::Bounded(b)) => MissCount::Bounded(a.saturating_add(b)),
            _ => MissCount::Unbounded,
        }
    }
}

impl fmt::Display for MissCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissCount::Bounded(n) => write!(f, "{n}"),
            MissCount::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Average outcome shares over a group of accesses.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shares {
    /// Number of accesses averaged.
    pub accesses: usize,
    /// Average share of not-classified trials.
    pub not_classified: f64,
    /// Average share of always-hit trials.
    pub always_hit: f64,
    /// Average share of persistent trials.
    pub persistent: f64,
    /// Average share of may-miss trials.
    pub may_miss: f64,
    /// Average share of always-miss trials.
    pub always_miss: f64,
}

impl Shares {
    fn average<'a>(stats: impl Iterator<Item = &'a Stat>) -> Self {
        let mut sum = [0.0; 5];
        let mut accesses = 0;
        for stat in stats {
            for (s, f) in sum.iter_mut().zip(stat.fractions()) {
                *s += f;
            }
            accesses += 1;
        }
        if accesses > 0 {
            for s in &mut sum {
                *s /= accesses as f64;
            }
        }
        Self {
            accesses,
            not_classified: sum[0],
            always_hit: sum[1],
            persistent: sum[2],
            may_miss: sum[3],
            always_miss: sum[4],
        }
    }
}

impl fmt::Display for Shares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} accesses: AH {:.1}% PE {:.1}% MM {:.1}% AM {:.1}% NC {:.1}%",
            self.accesses,
            self.always_hit * 100.0,
            self.persistent * 100.0,
            self.may_miss * 100.0,
            self.always_miss * 100.0,
            self.not_classified * 100.0
        )
    }
}

/// Summary of a whole-program classification.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Statistics {
    /// Shares over every access.
    pub all: Shares,
    /// Shares over accesses with more than one trial.
    pub arrays: Shares,
}

impl Statistics {
    /// Summarizes the counters of every access.
    #[must_use]
    pub fn collect<'a>(stats: impl Iterator<Item = &'a Stat> + Clone) -> Self {
        Self {
            all: Shares::average(stats.clone()),
            arrays: Shares::average(stats.filter(|s| s.trials() > 1)),
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {}; arrays {}", self.all, self.arrays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(ah: u64, am: u64, mm: u64, pe: u64, nc: u64) -> Stat {
        Stat {
            always_hit: ah,
            always_miss: am,
            may_miss: mm,
            persistent: pe,
            not_classified: nc,
        }
    }

    #[test]
    fn test_category_precedence() {
        assert_eq!(stat(3, 0, 0, 0, 0).category(), Category::AlwaysHit);
        assert_eq!(stat(2, 1, 0, 0, 0).category(), Category::AlwaysMiss);
        assert_eq!(stat(0, 1, 0, 9, 0).category(), Category::Persistent);
        assert_eq!(stat(0, 1, 2, 0, 0).category(), Category::MayMiss);
        assert_eq!(stat(5, 0, 0, 5, 1).category(), Category::NotClassified);
        assert_eq!(Stat::default().category(), Category::AlwaysMiss);
        assert_eq!(Category::Persistent.to_string(), "PE");
        assert_eq!((stat(1, 0, 0, 0, 0) + stat(0, 2, 0, 0, 0)).trials(), 3);
    }

    #[test]
    fn test_miss_count_arithmetic() {
        let a = MissCount::Bounded(3);
        assert_eq!(a + MissCount::Bounded(4), MissCount::Bounded(7));
        assert_eq!(a + MissCount::Unbounded, MissCount::Unbounded);
        assert_eq!(MissCount::Bounded(u64::MAX) + a, MissCount::Bounded(u64::MAX));
        assert_eq!(MissCount::default(), MissCount::ZERO);
        assert_eq!(MissCount::Unbounded.bound(), None);
        assert_eq!(MissCount::Unbounded.to_string(), "unbounded");
    }

    #[test]
    fn test_statistics() {
        let stats = [stat(1, 0, 0, 0, 0), stat(0, 1, 0, 3, 0), stat(0, 0, 0, 0, 1)];
        let summary = Statistics::collect(stats.iter());
        assert_eq!(summary.all.accesses, 3);
        assert!((summary.all.always_hit - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.arrays.accesses, 1);
        assert!((summary.arrays.persistent - 0.75).abs() < 1e-9);
        assert!(summary.to_string().starts_with("all 3 accesses"));
    }
}
