// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content-addressable object stores.
//!
//! Display-list objects share graphic state, clips, patterns, and soft masks.
//! Each kind lives in a [`DedupStore`]: interning a record that is
//! structurally equal to one already present returns the existing key and
//! costs no pool memory.

use alloc::vec::Vec;
use core::fmt;
use core::hash::{BuildHasher, Hash};

use rustc_hash::{FxBuildHasher, FxHashMap};

use super::pools::PagePools;
use crate::error::PageError;
use crate::geometry::DeviceRect;

/// Pool bytes charged per entry on top of the record itself.
const ENTRY_OVERHEAD: usize = 16;

/// Key of an interned record within its store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(pub u32);

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({})", self.0)
    }
}

/// A dedup cache keyed by structural hash.
///
/// Buckets map an Fx hash to the indices of every entry with that hash, and
/// lookups compare entries for equality, so hash collisions never merge
/// distinct records.
#[derive(Clone, Debug)]
pub struct DedupStore<T> {
    entries: Vec<T>,
    buckets: FxHashMap<u64, Vec<u32>>,
}

impl<T> Default for DedupStore<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            buckets: FxHashMap::default(),
        }
    }
}

impl<T: Hash + Eq> DedupStore<T> {
    /// Pool bytes one new entry costs.
    pub const ENTRY_BYTES: usize = size_of::<T>() + ENTRY_OVERHEAD;

    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key of `value`, inserting it if no equal record exists.
    ///
    /// A new entry reserves [`ENTRY_BYTES`](Self::ENTRY_BYTES) from `pools`;
    /// on exhaustion the store is left unchanged.
    pub fn intern(&mut self, value: T, pools: &mut PagePools) -> Result<StoreKey, PageError> {
        let hash = FxBuildHasher.hash_one(&value);
        if let Some(bucket) = self.buckets.get(&hash) {
            if let Some(&idx) = bucket.iter().find(|&&i| self.entries[i as usize] == value) {
                return Ok(StoreKey(idx));
            }
        }
        pools.reserve(Self::ENTRY_BYTES)?;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "store sizes are bounded by the pool budget"
        )]
        let idx = self.entries.len() as u32;
        self.entries.push(value);
        self.buckets.entry(hash).or_default().push(idx);
        Ok(StoreKey(idx))
    }

    /// Returns the record behind `key`.
    #[must_use]
    pub fn get(&self, key: StoreKey) -> Option<&T> {
        self.entries.get(key.0 as usize)
    }

    /// Number of distinct records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every record. Pool accounting is the caller's concern.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
    }
}

/// Separable blend modes carried by graphic state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Normal painting.
    #[default]
    SourceOver,
    /// Multiply.
    Multiply,
    /// Screen.
    Screen,
}

/// Graphic state shared by objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateRecord {
    /// Blend mode.
    pub blend: BlendMode,
    /// Constant alpha, 255 = opaque.
    pub alpha: u8,
    /// Overprint mode is on.
    pub overprint: bool,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            blend: BlendMode::SourceOver,
            alpha: u8::MAX,
            overprint: false,
        }
    }
}

/// A clip path, summarised by its device bounds and complexity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClipRecord {
    /// Device-space bounds.
    pub bbox: DeviceRect,
    /// Clip is exactly its bounding rectangle.
    pub rectangular: bool,
}

/// A pattern definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PatternRecord {
    /// Device-space cell bounds.
    pub cell: DeviceRect,
    /// Horizontal step in device units.
    pub x_step: i32,
    /// Vertical step in device units.
    pub y_step: i32,
    /// Colored (as opposed to uncolored/stencil) pattern.
    pub colored: bool,
}

/// A soft-mask definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoftMaskRecord {
    /// Device-space bounds of the mask group.
    pub bbox: DeviceRect,
    /// Luminosity mask (as opposed to alpha).
    pub luminosity: bool,
}

/// The per-page set of object stores.
#[derive(Clone, Debug, Default)]
pub struct ObjectStores {
    /// Graphic states.
    pub state: DedupStore<StateRecord>,
    /// Clips.
    pub clip: DedupStore<ClipRecord>,
    /// Patterns.
    pub pattern: DedupStore<PatternRecord>,
    /// Soft masks.
    pub soft_mask: DedupStore<SoftMaskRecord>,
    installed: bool,
}

impl ObjectStores {
    /// Returns `true` once the base records are present.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.installed
    }

    /// Seeds the stores with the default state and the page clip.
    ///
    /// On exhaustion the stores are cleared again.
    pub fn install(&mut self, page: DeviceRect, pools: &mut PagePools) -> Result<(), PageError> {
        let result = self
            .state
            .intern(StateRecord::default(), pools)
            .and_then(|_| {
                self.clip.intern(
                    ClipRecord {
                        bbox: page,
                        rectangular: true,
                    },
                    pools,
                )
            });
        match result {
            Ok(_) => {
                self.installed = true;
                Ok(())
            }
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Total distinct records across every store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len() + self.clip.len() + self.pattern.len() + self.soft_mask.len()
    }

    /// Returns `true` if every store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pool bytes the records hold.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.state.len() * DedupStore::<StateRecord>::ENTRY_BYTES
            + self.clip.len() * DedupStore::<ClipRecord>::ENTRY_BYTES
            + self.pattern.len() * DedupStore::<PatternRecord>::ENTRY_BYTES
            + self.soft_mask.len() * DedupStore::<SoftMaskRecord>::ENTRY_BYTES
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.state.clear();
        self.clip.clear();
        self.pattern.clear();
        self.soft_mask.clear();
        self.installed = false;
    }
}
