// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer device-space rectangles.
//!
//! Display-list objects, region tiles, and renderer requests all speak in
//! device units. [`DeviceRect`] is half-open (`x0..x1`, `y0..y1`) so tiles
//! abut without shared edges and an empty rectangle is any rectangle whose
//! far edge does not exceed its near edge.
//!
//! Interpreters usually work in floating-point user space; [`DeviceRect::from_kurbo`]
//! rounds a [`kurbo::Rect`] outwards so every touched pixel is covered.

use core::fmt;

/// A half-open axis-aligned rectangle in device units.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceRect {
    /// Left edge (inclusive).
    pub x0: i32,
    /// Top edge (inclusive).
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
}

impl DeviceRect {
    /// The empty rectangle at the origin.
    pub const EMPTY: Self = Self::new(0, 0, 0, 0);

    /// Creates a rectangle from its edges.
    #[inline]
    #[must_use]
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Creates a rectangle from an origin and a size. Far edges saturate at
    /// `i32::MAX`.
    #[inline]
    #[must_use]
    pub const fn from_origin_size(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self::new(
            x,
            y,
            x.saturating_add_unsigned(width),
            y.saturating_add_unsigned(height),
        )
    }

    /// Rounds a floating-point rectangle outwards to device units.
    #[must_use]
    pub fn from_kurbo(rect: kurbo::Rect) -> Self {
        let rect = rect.abs().expand();
        #[expect(
            clippy::cast_possible_truncation,
            reason = "expanded edges are integral and float casts saturate, which only clips off-page area"
        )]
        Self::new(rect.x0 as i32, rect.y0 as i32, rect.x1 as i32, rect.y1 as i32)
    }

    /// Converts to a [`kurbo::Rect`].
    #[must_use]
    pub fn to_kurbo(self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }

    /// Returns `true` if the rectangle covers no pixels.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }

    /// Width in device units (zero when empty).
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        if self.x1 > self.x0 {
            self.x1.abs_diff(self.x0)
        } else {
            0
        }
    }

    /// Height in device units (zero when empty).
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        if self.y1 > self.y0 {
            self.y1.abs_diff(self.y0)
        } else {
            0
        }
    }

    /// Area in device pixels.
    #[inline]
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Returns the intersection, or `None` if the rectangles do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let r = Self::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        (!r.is_empty()).then_some(r)
    }

    /// Returns `true` if the rectangles share at least one pixel.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }

    /// Returns `true` if `other` lies entirely inside `self`.
    ///
    /// An empty `other` is contained by everything.
    #[must_use]
    pub const fn contains_rect(&self, other: &Self) -> bool {
        other.is_empty()
            || (other.x0 >= self.x0
                && other.y0 >= self.y0
                && other.x1 <= self.x1
                && other.y1 <= self.y1)
    }

    /// Returns the smallest rectangle covering both inputs.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }
}

impl fmt::Debug for DeviceRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceRect[{},{} .. {},{}]", self.x0, self.y0, self.x1, self.y1)
    }
}
