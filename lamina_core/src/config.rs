// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline and region configuration.

use crate::error::PipelineError;

/// Which block alpha the soft-mask marking treats as directly renderable.
///
/// A soft-masked image can skip compositing in regions where its mask is
/// uniformly at one extreme, because the renderer then treats the image as
/// either absent or opaque there. Only one extreme is optimised per image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptimisePolicy {
    /// Pick whichever extreme has more uniform blocks in the mask (opaque on
    /// a tie).
    Majority,
    /// Always optimise fully transparent blocks.
    Transparent,
    /// Always optimise fully opaque blocks.
    Opaque,
}

/// Region tile geometry and marking heuristics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionConfig {
    /// Tile width in device units.
    pub tile_width: u32,
    /// Tile height in device units, before the page device's cap.
    pub tile_height: u32,
    /// Soft-mask optimisation policy.
    pub optimise: OptimisePolicy,
}

impl RegionConfig {
    /// Default tile edge in device units.
    pub const DEFAULT_TILE: u32 = 128;

    /// 128×128 tiles with majority optimisation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tile_width: Self::DEFAULT_TILE,
            tile_height: Self::DEFAULT_TILE,
            optimise: OptimisePolicy::Majority,
        }
    }

    /// Tile height after applying the page device's backdrop tile cap.
    #[must_use]
    pub const fn effective_tile_height(&self, max_backdrop_tile_height: Option<u32>) -> u32 {
        match max_backdrop_tile_height {
            Some(cap) if cap > 0 && cap < self.tile_height => cap,
            _ => self.tile_height,
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration of a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineConfig {
    /// Number of page slots in the ring.
    pub capacity: usize,
    /// Pages allowed in flight behind the one under construction before
    /// `end_page` blocks. Zero renders every page synchronously.
    pub pipeline_depth: usize,
    /// Byte budget of each page's pools.
    pub pool_budget: usize,
    /// Track colorant backgrounds so overprinting objects composite only
    /// where they overlap earlier marks.
    pub overprint_tracking: bool,
    /// Region tile geometry.
    pub region: RegionConfig,
}

impl PipelineConfig {
    /// Four slots, two pages rendering behind construction.
    #[must_use]
    pub const fn throughput() -> Self {
        Self {
            capacity: 4,
            pipeline_depth: 2,
            pool_budget: 64 << 20,
            overprint_tracking: true,
            region: RegionConfig::new(),
        }
    }

    /// Render and tear down every page before the next one starts.
    #[must_use]
    pub const fn synchronous() -> Self {
        Self {
            capacity: 2,
            pipeline_depth: 0,
            pool_budget: 64 << 20,
            overprint_tracking: true,
            region: RegionConfig::new(),
        }
    }

    /// Checks the structural requirements of the ring and region grid.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.capacity < 2 {
            return Err(PipelineError::InvalidConfig(
                "capacity must leave one free slot between input and flush",
            ));
        }
        if self.pipeline_depth >= self.capacity {
            return Err(PipelineError::InvalidConfig(
                "pipeline depth must be below capacity",
            ));
        }
        if self.region.tile_width == 0 || self.region.tile_height == 0 {
            return Err(PipelineError::InvalidConfig("region tiles must be non-empty"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::throughput()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_validate() {
        assert!(PipelineConfig::throughput().validate().is_ok());
        assert!(PipelineConfig::synchronous().validate().is_ok());
    }

    #[test]
    fn depth_must_leave_a_free_slot() {
        let config = PipelineConfig {
            pipeline_depth: 4,
            ..PipelineConfig::throughput()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
        let config = PipelineConfig {
            capacity: 1,
            pipeline_depth: 0,
            ..PipelineConfig::throughput()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tiles_rejected() {
        let mut config = PipelineConfig::throughput();
        config.region.tile_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn backdrop_cap_only_shrinks_tiles() {
        let region = RegionConfig::new();
        assert_eq!(region.effective_tile_height(None), 128);
        assert_eq!(region.effective_tile_height(Some(64)), 64);
        assert_eq!(region.effective_tile_height(Some(512)), 128);
        assert_eq!(region.effective_tile_height(Some(0)), 128);
    }
}
