// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Page-device parameters, raster style, and derived page geometry.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::RegionConfig;
use crate::display_list::ColorantId;
use crate::region::RegionGrid;

/// How a colorant reaches the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorantKind {
    /// A process colorant, directly an output channel.
    Process,
    /// A named spot colorant with its own separation.
    Spot,
    /// A colorant that is converted to process colorants before output.
    Virtual,
}

/// One colorant of a raster style.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ColorantInfo {
    /// Colorant id used in paint colors.
    pub id: ColorantId,
    /// Human-readable name.
    pub name: String,
    /// Output kind.
    pub kind: ColorantKind,
}

/// The colorant set a page rasterizes into.
///
/// Shared between consecutive pages of a page device; a full teardown
/// releases the page's reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RasterStyle {
    /// Colorants in output order.
    pub colorants: Vec<ColorantInfo>,
}

impl RasterStyle {
    /// Cyan, magenta, yellow, black as colorants 0 to 3.
    #[must_use]
    pub fn cmyk() -> Self {
        let colorants = ["Cyan", "Magenta", "Yellow", "Black"]
            .into_iter()
            .zip(0_u16..)
            .map(|(name, id)| ColorantInfo {
                id: ColorantId(id),
                name: name.into(),
                kind: ColorantKind::Process,
            })
            .collect();
        Self { colorants }
    }

    /// Adds a colorant after the existing ones and returns its id.
    pub fn add(&mut self, name: impl Into<String>, kind: ColorantKind) -> ColorantId {
        let next = self.colorants.iter().map(|c| c.id.0 + 1).max().unwrap_or(0);
        let id = ColorantId(next);
        self.colorants.push(ColorantInfo {
            id,
            name: name.into(),
            kind,
        });
        id
    }

    /// Returns `true` if any colorant is spot or virtual.
    #[must_use]
    pub fn has_non_process(&self) -> bool {
        self.colorants
            .iter()
            .any(|c| !matches!(c.kind, ColorantKind::Process))
    }

    /// Ids of every colorant.
    pub fn ids(&self) -> impl Iterator<Item = ColorantId> + '_ {
        self.colorants.iter().map(|c| c.id)
    }
}

/// Parameters the interpreter's page device sets for a run of pages.
#[derive(Clone, Debug, PartialEq)]
pub struct PageDevice {
    /// Page width in device pixels.
    pub width: u32,
    /// Page height in device pixels.
    pub height: u32,
    /// Device resolution in pixels per inch.
    pub resolution: f64,
    /// Band height in device pixels.
    pub band_height: u32,
    /// Cap on backdrop tile height, if the device sets one.
    pub max_backdrop_tile_height: Option<u32>,
    /// Output colorants.
    pub raster_style: Arc<RasterStyle>,
}

impl PageDevice {
    /// A CMYK device at the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            resolution: 600.0,
            band_height: 64,
            max_backdrop_tile_height: None,
            raster_style: Arc::new(RasterStyle::cmyk()),
        }
    }
}

/// Geometry invariant across the pages of one page device.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageGeometry {
    /// Page width in device pixels.
    pub width: u32,
    /// Page height in device pixels.
    pub height: u32,
    /// Pixels per inch.
    pub resolution: f64,
    /// Band height in device pixels.
    pub band_height: u32,
    /// Region tiling.
    pub grid: RegionGrid,
}

impl PageGeometry {
    /// Derives geometry from device parameters and region configuration.
    #[must_use]
    pub fn new(device: &PageDevice, region: &RegionConfig) -> Self {
        let tile_height = region.effective_tile_height(device.max_backdrop_tile_height);
        Self {
            width: device.width,
            height: device.height,
            resolution: device.resolution,
            band_height: device.band_height,
            grid: RegionGrid::new(device.width, device.height, region.tile_width, tile_height),
        }
    }

    /// Number of bands down the page.
    #[must_use]
    pub const fn bands(&self) -> u32 {
        if self.band_height == 0 {
            0
        } else {
            self.height.div_ceil(self.band_height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_applies_backdrop_cap() {
        let mut device = PageDevice::new(800, 600);
        device.max_backdrop_tile_height = Some(100);
        let geometry = PageGeometry::new(&device, &RegionConfig::new());
        assert_eq!(geometry.grid.tile_height(), 100);
        assert_eq!((geometry.grid.columns(), geometry.grid.rows()), (7, 6));
        assert_eq!(geometry.bands(), 10);
    }

    #[test]
    fn spot_colorant_enables_tracking() {
        let mut style = RasterStyle::cmyk();
        assert!(!style.has_non_process());
        let spot = style.add("PANTONE 185 C", ColorantKind::Spot);
        assert_eq!(spot, ColorantId(4));
        assert!(style.has_non_process());
        assert_eq!(style.ids().count(), 5);
    }
}
