// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Leaf display-list objects and their paint attributes.

use alloc::vec::Vec;
use core::fmt;

use crate::geometry::DeviceRect;

/// Identifies a colorant (process, spot, or virtual) of the raster style.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColorantId(pub u16);

impl fmt::Debug for ColorantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColorantId({})", self.0)
    }
}

/// The color an object paints with.
///
/// `colorants` lists the colorants the object explicitly paints, each with a
/// tint in `0.0..=1.0`. A zero tint is white and leaves no mark on the
/// background. `converted` is set when a color-conversion chain sits between
/// the object's native space and the raster style, so colorants missing from
/// the list may still be introduced at render time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaintColor {
    /// Explicit colorants and their tints.
    pub colorants: Vec<(ColorantId, f32)>,
    /// Whether color conversion may introduce further colorants.
    pub converted: bool,
}

impl PaintColor {
    /// A color painting only the given colorants at full tint.
    #[must_use]
    pub fn solid(colorants: &[ColorantId]) -> Self {
        Self {
            colorants: colorants.iter().map(|&c| (c, 1.0)).collect(),
            converted: false,
        }
    }

    /// Paper white: no colorant marks.
    #[must_use]
    pub fn white() -> Self {
        Self::default()
    }

    /// Returns `true` if `colorant` is explicitly part of this color.
    #[must_use]
    pub fn paints(&self, colorant: ColorantId) -> bool {
        self.colorants.iter().any(|&(c, _)| c == colorant)
    }

    /// Returns `true` if `colorant` is painted with a non-zero tint.
    #[must_use]
    pub fn marks(&self, colorant: ColorantId) -> bool {
        self.colorants
            .iter()
            .any(|&(c, tint)| c == colorant && tint > 0.0)
    }
}

/// Per-object flag bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ObjectFlags {
    /// The object needs backdrop compositing wherever it paints.
    pub transparent_everywhere: bool,
    /// The object overprints (does not knock out unpainted colorants).
    pub overprint: bool,
    /// The object knocks out earlier objects in its knockout group.
    pub knockout: bool,
    /// Multi-pass recombination intercepted this object or its pattern.
    pub recombine_intercepted: bool,
    /// The object is filled with a pattern.
    pub has_pattern: bool,
}

/// Alpha of one block of a soft-mask image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockAlpha {
    /// Every sample of the block has this alpha (0 = transparent, 255 = opaque).
    Uniform(u8),
    /// Samples differ within the block.
    Mixed,
}

impl BlockAlpha {
    /// Fully transparent block.
    pub const TRANSPARENT: Self = Self::Uniform(0);
    /// Fully opaque block.
    pub const OPAQUE: Self = Self::Uniform(u8::MAX);
}

/// Uniform-value block summary of a soft-mask image.
///
/// Blocks tile the image's bounding box from its top-left corner; the last
/// row and column may extend past the box and are clipped by it.
#[derive(Clone, Debug, PartialEq)]
pub struct AlphaBlocks {
    bbox: DeviceRect,
    block_width: u32,
    block_height: u32,
    columns: u32,
    rows: u32,
    values: Vec<BlockAlpha>,
}

impl AlphaBlocks {
    /// Creates a block summary over `bbox` from row-major block values.
    ///
    /// # Panics
    ///
    /// Panics if a block dimension is zero or `values` does not hold exactly
    /// one entry per block.
    #[must_use]
    pub fn new(bbox: DeviceRect, block_width: u32, block_height: u32, values: Vec<BlockAlpha>) -> Self {
        assert!(
            block_width > 0 && block_height > 0,
            "alpha blocks must have a non-zero size"
        );
        let columns = bbox.width().div_ceil(block_width);
        let rows = bbox.height().div_ceil(block_height);
        assert_eq!(
            values.len(),
            columns as usize * rows as usize,
            "one alpha value is required per block"
        );
        Self {
            bbox,
            block_width,
            block_height,
            columns,
            rows,
            values,
        }
    }

    /// Creates a summary where every block has the same alpha.
    #[must_use]
    pub fn uniform(bbox: DeviceRect, block_width: u32, block_height: u32, alpha: BlockAlpha) -> Self {
        let columns = bbox.width().div_ceil(block_width.max(1));
        let rows = bbox.height().div_ceil(block_height.max(1));
        Self::new(
            bbox,
            block_width,
            block_height,
            alloc::vec![alpha; columns as usize * rows as usize],
        )
    }

    /// Number of blocks across.
    #[must_use]
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of blocks down.
    #[must_use]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Overwrites one block's value.
    ///
    /// # Panics
    ///
    /// Panics if the block coordinates are out of range.
    pub fn set(&mut self, column: u32, row: u32, alpha: BlockAlpha) {
        assert!(
            column < self.columns && row < self.rows,
            "alpha block out of range"
        );
        self.values[(row * self.columns + column) as usize] = alpha;
    }

    /// Counts blocks that are uniformly `alpha`.
    #[must_use]
    pub fn count_uniform(&self, alpha: u8) -> usize {
        self.values
            .iter()
            .filter(|v| **v == BlockAlpha::Uniform(alpha))
            .count()
    }

    /// Visits the value of every block intersecting `rect`.
    pub fn blocks_in(&self, rect: &DeviceRect) -> impl Iterator<Item = BlockAlpha> + '_ {
        let clipped = rect.intersect(&self.bbox);
        let (c0, r0, c1, r1) = match clipped {
            Some(r) => {
                let c0 = r.x0.abs_diff(self.bbox.x0) / self.block_width;
                let r0 = r.y0.abs_diff(self.bbox.y0) / self.block_height;
                let c1 = (r.x1 - 1).abs_diff(self.bbox.x0) / self.block_width;
                let r1 = (r.y1 - 1).abs_diff(self.bbox.y0) / self.block_height;
                (c0, r0, c1 + 1, r1 + 1)
            }
            None => (0, 0, 0, 0),
        };
        (r0..r1).flat_map(move |row| {
            (c0..c1).map(move |col| self.values[(row * self.columns + col) as usize])
        })
    }
}

/// What kind of mark an object makes.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectKind {
    /// A filled shape or stroke.
    Fill,
    /// Glyphs.
    Text,
    /// A raster image, optionally carrying a soft mask.
    Image {
        /// Block summary of the image's soft mask, if it has one.
        soft_mask: Option<AlphaBlocks>,
    },
    /// The implicit page-background erase installed at construction.
    Erase,
}

/// A leaf display-list object.
///
/// Produced by the interpreter; the marking pass may update its flags.
#[derive(Clone, Debug, PartialEq)]
pub struct DlObject {
    /// Device-space bounding box.
    pub bbox: DeviceRect,
    /// Paint color.
    pub color: PaintColor,
    /// Flag bits.
    pub flags: ObjectFlags,
    /// Mark kind.
    pub kind: ObjectKind,
}

impl DlObject {
    /// An opaque fill.
    #[must_use]
    pub fn fill(bbox: DeviceRect, color: PaintColor) -> Self {
        Self {
            bbox,
            color,
            flags: ObjectFlags::default(),
            kind: ObjectKind::Fill,
        }
    }

    /// A fill flagged as needing compositing wherever it paints.
    #[must_use]
    pub fn transparent_fill(bbox: DeviceRect, color: PaintColor) -> Self {
        Self {
            flags: ObjectFlags {
                transparent_everywhere: true,
                ..ObjectFlags::default()
            },
            ..Self::fill(bbox, color)
        }
    }

    /// An image with a soft mask.
    ///
    /// Until marking proves otherwise the image is assumed to be transparent
    /// everywhere it paints.
    #[must_use]
    pub fn masked_image(bbox: DeviceRect, color: PaintColor, mask: AlphaBlocks) -> Self {
        Self {
            bbox,
            color,
            flags: ObjectFlags {
                transparent_everywhere: true,
                ..ObjectFlags::default()
            },
            kind: ObjectKind::Image {
                soft_mask: Some(mask),
            },
        }
    }

    /// The page-background erase object.
    #[must_use]
    pub fn erase(bbox: DeviceRect) -> Self {
        Self {
            bbox,
            color: PaintColor::white(),
            flags: ObjectFlags::default(),
            kind: ObjectKind::Erase,
        }
    }

    /// Returns the soft-mask summary if this is a masked image.
    #[must_use]
    pub fn soft_mask(&self) -> Option<&AlphaBlocks> {
        match &self.kind {
            ObjectKind::Image { soft_mask } => soft_mask.as_ref(),
            _ => None,
        }
    }
}
