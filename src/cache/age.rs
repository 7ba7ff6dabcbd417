//! Abstract LRU ages.
//!
//! An LRU line's age is the number of distinct other lines accessed in its
//! set since its own last access; the line is evicted once its age reaches
//! the associativity `A`. The three domains of this module bound that age from
//! different sides:
//!
//! - [`MustAge`] - an upper bound; a line whose bound stays below `A` is
//!   certainly cached (always-hit)
//! - [`MayAge`] - a lower bound; a line whose bound reaches `A` is certainly
//!   evicted (always-miss)
//! - [`PersistenceAge`] - one upper bound per enclosing loop level, sticky at
//!   `A`; a line alive at the innermost level is never evicted once loaded
//!   during the current execution of that loop (persistent)
//!
//! # Update rule
//!
//! An access whose target line has (worst) age `h` ages every line of age at
//! most `h` by one, saturating at `A`, and leaves older lines alone. A miss
//! uses `h = A` and ages everything.

use std::fmt::Debug;

/// Scalar age, `0..=A`.
pub type Age = u8;

/// Contract of an abstract age domain.
///
/// `depth` is the loop nesting depth of the program point; only
/// [`PersistenceAge`] uses it.
///
/// Implementations must be monotone: [`update`](Self::update) never makes a
/// dead age alive again.
pub trait AgeDomain {
    /// Abstract age value.
    type Value: Clone + Debug + PartialEq + Eq;

    /// Age of a line just accessed.
    fn init(&self, depth: usize) -> Self::Value;

    /// Age of a line about which nothing is known.
    fn undef(&self, depth: usize) -> Self::Value;

    /// Merges ages arriving on two paths.
    #[must_use]
    fn join(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// Ages a line for an access to another line of age `use_age`.
    #[must_use]
    fn update(&self, value: &Self::Value, use_age: Age) -> Self::Value;

    /// Age of a line after an access to it.
    #[must_use]
    fn touch(&self, value: &Self::Value) -> Self::Value;

    /// Returns true if the line may still be cached under this bound.
    fn is_alive(&self, value: &Self::Value) -> bool;
}

const fn step(age: Age, use_age: Age, ways: Age) -> Age {
    if age <= use_age && age < ways {
        age + 1
    } else {
        age
    }
}

/// Upper bound on the age of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MustAge {
    ways: Age,
}

impl MustAge {
    /// Creates the domain for an `ways`-way cache.
    #[must_use]
    pub const fn new(ways: Age) -> Self {
        Self { ways }
    }
}

impl AgeDomain for MustAge {
    type Value = Age;

    fn init(&self, _depth: usize) -> Age {
        0
    }

    fn undef(&self, _depth: usize) -> Age {
        self.ways
    }

    fn join(&self, a: &Age, b: &Age) -> Age {
        *a.max(b)
    }

    fn update(&self, value: &Age, use_age: Age) -> Age {
        step(*value, use_age, self.ways)
    }

    fn touch(&self, _value: &Age) -> Age {
        0
    }

    fn is_alive(&self, value: &Age) -> bool {
        *value < self.ways
    }
}

/// Lower bound on the age of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MayAge {
    ways: Age,
}

impl MayAge {
    /// Creates the domain for an `ways`-way cache.
    #[must_use]
    pub const fn new(ways: Age) -> Self {
        Self { ways }
    }
}

impl AgeDomain for MayAge {
    type Value = Age;

    fn init(&self, _depth: usize) -> Age {
        0
    }

    fn undef(&self, _depth: usize) -> Age {
        0
    }

    fn join(&self, a: &Age, b: &Age) -> Age {
        *a.min(b)
    }

    fn update(&self, value: &Age, use_age: Age) -> Age {
        step(*value, use_age, self.ways)
    }

    fn touch(&self, _value: &Age) -> Age {
        0
    }

    fn is_alive(&self, value: &Age) -> bool {
        *value < self.ways
    }
}

/// Per-loop-level upper bounds on the age of a line, innermost level last.
///
/// Level 0 covers the whole program; level `k` the current execution of the
/// `k`-th enclosing loop. An eviction at a level sticks until the level is
/// left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceAge {
    ways: Age,
}

impl PersistenceAge {
    /// Creates the domain for an `ways`-way cache.
    #[must_use]
    pub const fn new(ways: Age) -> Self {
        Self { ways }
    }

    /// Opens a level for a loop being entered.
    #[must_use]
    pub fn enter(&self, value: &[Age]) -> Vec<Age> {
        let mut levels = value.to_vec();
        levels.push(0);
        levels
    }

    /// Closes the innermost level, folding it into its parent.
    #[must_use]
    pub fn leave(&self, value: &[Age]) -> Vec<Age> {
        let mut levels = value.to_vec();
        if levels.len() > 1 {
            if let Some(inner) = levels.pop() {
                if let Some(parent) = levels.last_mut() {
                    *parent = (*parent).max(inner);
                }
            }
        }
        levels
    }
}

impl AgeDomain for PersistenceAge {
    type Value = Vec<Age>;

    fn init(&self, depth: usize) -> Vec<Age> {
        vec![0; depth + 1]
    }

    fn undef(&self, depth: usize) -> Vec<Age> {
        vec![self.ways; depth + 1]
    }

    /// Level-wise maximum; levels only one side has are kept.
    fn join(&self, a: &Vec<Age>, b: &Vec<Age>) -> Vec<Age> {
        let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
        let mut levels = long.clone();
        for (level, &other) in levels.iter_mut().zip(short.iter()) {
            *level = (*level).max(other);
        }
        levels
    }

    fn update(&self, value: &Vec<Age>, use_age: Age) -> Vec<Age> {
        value.iter().map(|&a| step(a, use_age, self.ways)).collect()
    }

    fn touch(&self, value: &Vec<Age>) -> Vec<Age> {
        value
            .iter()
            .map(|&a| if a < self.ways { 0 } else { a })
            .collect()
    }

    fn is_alive(&self, value: &Vec<Age>) -> bool {
        value.last().is_some_and(|&a| a < self.ways)
    }
}
