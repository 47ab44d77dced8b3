// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Byte-budget accounting for a page's memory pools.

use crate::error::PageError;

/// Tracks bytes reserved from a page's pools against a budget.
///
/// Every allocation a page makes during construction (store entries,
/// display-list nodes, construction overhead) goes through
/// [`reserve`](Self::reserve). A failed reservation leaves the accounting
/// untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagePools {
    budget: usize,
    used: usize,
    high_water: usize,
}

impl PagePools {
    /// Creates empty pools with the given budget.
    #[must_use]
    pub const fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            high_water: 0,
        }
    }

    /// Bytes currently reserved.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Bytes still available.
    #[must_use]
    pub const fn available(&self) -> usize {
        self.budget.saturating_sub(self.used)
    }

    /// Configured budget.
    #[must_use]
    pub const fn budget(&self) -> usize {
        self.budget
    }

    /// Largest reservation total seen since the pools were last released.
    #[must_use]
    pub const fn high_water(&self) -> usize {
        self.high_water
    }

    /// Reserves `bytes`, failing without side effects if they do not fit.
    pub fn reserve(&mut self, bytes: usize) -> Result<(), PageError> {
        let available = self.available();
        if bytes > available {
            return Err(PageError::OutOfMemory {
                requested: bytes,
                available,
            });
        }
        self.used += bytes;
        self.high_water = self.high_water.max(self.used);
        Ok(())
    }

    /// Returns `bytes` to the pools.
    pub fn unreserve(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.used, "returning more than was reserved");
        self.used = self.used.saturating_sub(bytes);
    }

    /// Changes the budget. Models a reclaim (or a tighter limit) between a
    /// failed construction and its retry.
    pub fn set_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    /// Releases every reservation.
    pub fn release(&mut self) {
        self.used = 0;
        self.high_water = 0;
    }

    /// Keeps only `kept` bytes reserved, for pools whose other holdings were
    /// dropped wholesale. The high-water mark restarts from there.
    pub fn rebase(&mut self, kept: usize) {
        debug_assert!(kept <= self.used, "rebasing above what is reserved");
        self.used = kept.min(self.used);
        self.high_water = self.used;
    }
}
