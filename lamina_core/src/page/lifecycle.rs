// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The page lifecycle state machine.
//!
//! ```text
//!            Constructed              Retire(mode)
//!   Begin ───────────────► Clear ─────────────────► Retired(mode)
//!   ▲   │                                                 │
//!   │   └─ ConstructionFailed ─► Begin                    │
//!   └──────────────────────── Erased ─────────────────────┘
//! ```
//!
//! Every state change goes through [`Lifecycle::apply`], so the tag is never
//! left between states and an out-of-order call is an error value rather
//! than silent corruption.

use crate::error::TransitionError;

/// How a page is being destroyed, and what survives its teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TeardownMode {
    /// The page is finished; a new page follows on the next ring slot.
    FullTeardown,
    /// Partial paint that releases pools but keeps the interpreter poised to
    /// continue the same page.
    PartialDestroy,
    /// Partial paint that keeps pools and interpreter state, for when an
    /// in-progress pattern, form, or vignette must survive.
    PartialPreserve,
    /// Mid-page copy: keep nearly everything, reset per-page counters.
    CopyReuse,
    /// The page's output already went elsewhere; release without rendering.
    AlreadyGone,
}

impl TeardownMode {
    /// Whether construction of the same page continues after teardown.
    #[must_use]
    pub const fn continues(self) -> bool {
        matches!(
            self,
            Self::PartialDestroy | Self::PartialPreserve | Self::CopyReuse
        )
    }

    /// Whether teardown releases the shared raster style and the job.
    #[must_use]
    pub const fn releases_shared(self) -> bool {
        matches!(self, Self::FullTeardown | Self::AlreadyGone)
    }

    /// Whether teardown releases the page's pools and stores.
    #[must_use]
    pub const fn releases_pools(self) -> bool {
        matches!(
            self,
            Self::FullTeardown | Self::AlreadyGone | Self::PartialDestroy
        )
    }

    /// Whether teardown discards the display-list content.
    #[must_use]
    pub const fn discards_content(self) -> bool {
        !matches!(self, Self::CopyReuse)
    }
}

/// Lifecycle tag of a page slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Under construction; not usable for content.
    Begin,
    /// Constructed and accepting content.
    Clear,
    /// Being destroyed in the given mode.
    Retired(TeardownMode),
}

/// Input to the lifecycle state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Stores, base group, and erase object are installed.
    Constructed,
    /// Construction ran out of memory and was rolled back.
    ConstructionFailed,
    /// The page is retired with a teardown mode.
    Retire(TeardownMode),
    /// Teardown finished.
    Erased,
}

impl Lifecycle {
    /// Applies `event`, returning the next state.
    pub const fn apply(self, event: LifecycleEvent) -> Result<Self, TransitionError> {
        use Lifecycle::{Begin, Clear, Retired};
        use LifecycleEvent::{ConstructionFailed, Constructed, Erased, Retire};

        match (self, event) {
            (Begin, Constructed) => Ok(Clear),
            (Begin, ConstructionFailed) => Ok(Begin),
            (Clear, Retire(mode)) => Ok(Retired(mode)),
            (Retired(_), Erased) => Ok(Begin),
            (from, event) => Err(TransitionError { from, event }),
        }
    }

    /// The teardown mode, if retired.
    #[must_use]
    pub const fn teardown_mode(self) -> Option<TeardownMode> {
        match self {
            Self::Retired(mode) => Some(mode),
            _ => None,
        }
    }

    /// Whether the page accepts content.
    #[must_use]
    pub const fn is_clear(self) -> bool {
        matches!(self, Self::Clear)
    }
}
