//! Lazily recomputed derived values
//!
//! [`Cached`] wraps a derived value with an explicit `{Clean, Dirty}` state.
//! Writers of any dependency call [`Cached::invalidate`]; readers call
//! [`Cached::get_or_update`] with the recompute function, which only runs when
//! the value is dirty.
//!
//! Uses interior mutability (`Cell`) so that reads can go through a shared
//! reference while still updating the cache.

use std::cell::Cell;

/// Cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Clean,
    Dirty,
}

/// A cached derived value.
#[derive(Debug, Clone)]
pub struct Cached<T: Copy> {
    value: Cell<T>,
    state: Cell<CacheState>,
    recomputes: Cell<u32>,
}

impl<T: Copy> Cached<T> {
    /// Create a dirty cache holding a placeholder value.
    pub fn new(placeholder: T) -> Self {
        Self {
            value: Cell::new(placeholder),
            state: Cell::new(CacheState::Dirty),
            recomputes: Cell::new(0),
        }
    }

    /// Mark the value stale.
    #[inline]
    pub fn invalidate(&self) {
        self.state.set(CacheState::Dirty);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.state.get() == CacheState::Dirty
    }

    #[inline]
    pub fn state(&self) -> CacheState {
        self.state.get()
    }

    /// Return the cached value, recomputing it first if dirty.
    pub fn get_or_update(&self, recompute: impl FnOnce() -> T) -> T {
        if self.is_dirty() {
            self.value.set(recompute());
            self.state.set(CacheState::Clean);
            self.recomputes.set(self.recomputes.get().wrapping_add(1));
        }
        self.value.get()
    }

    /// Store a value directly and mark it clean.
    ///
    /// Does not count as a recompute.
    pub fn set(&self, value: T) {
        self.value.set(value);
        self.state.set(CacheState::Clean);
    }

    /// Number of times the recompute function has run.
    pub fn recompute_count(&self) -> u32 {
        self.recomputes.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_dirty() {
        let cached = Cached::new(0u32);
        assert!(cached.is_dirty());
        assert_eq!(cached.recompute_count(), 0);
    }

    #[test]
    fn test_recomputes_once_per_invalidation() {
        let cached = Cached::new(0u32);

        assert_eq!(cached.get_or_update(|| 7), 7);
        assert_eq!(cached.get_or_update(|| 8), 7);
        assert_eq!(cached.recompute_count(), 1);
        assert_eq!(cached.state(), CacheState::Clean);

        cached.invalidate();
        cached.invalidate();
        assert_eq!(cached.get_or_update(|| 9), 9);
        assert_eq!(cached.recompute_count(), 2);
    }

    #[test]
    fn test_set_marks_clean_without_counting() {
        let cached = Cached::new(1.0f32);
        cached.set(3.0);
        assert!(!cached.is_dirty());
        assert_eq!(cached.get_or_update(|| 5.0), 3.0);
        assert_eq!(cached.recompute_count(), 0);
    }
}
