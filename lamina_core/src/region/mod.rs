// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Region-based compositing decisions.
//!
//! The page is tiled into fixed-size regions ([`RegionGrid`], 128×128 device
//! units by default). After construction, [`Page::mark_regions`] walks the
//! display list once in paint order and records in a [`RegionMap`] which
//! tiles need backdrop compositing. A page with no such tile keeps no map at
//! all. The renderer then asks [`RegionQuery`] whether an object composites
//! everywhere it paints, and for maximal uniform rectangles to render.
//!
//! [`Page::mark_regions`]: crate::page::Page::mark_regions

mod background;
mod map;
mod mark;
mod query;

pub use map::{RegionBits, RegionGrid, RegionMap, TileSpan};
pub use mark::{MarkStats, RegionMarker};
pub use query::{RegionIter, RegionQuery, RegionSpan};
