use std::sync::Arc;

use thiserror::Error;

use crate::catalog::Tier;

/// Outcome of a failed cache fetch.
///
/// Cloneable so every caller joined on the same in-flight fetch observes the
/// same failure.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// Transport or decode failure for one frame URL.
    #[error("failed to fetch {tier} frame {index} from {url}: {reason:#}")]
    Fetch {
        tier: Tier,
        index: usize,
        url: String,
        reason: Arc<anyhow::Error>,
    },

    /// The caller required a fresh fetch but the entry is already cached.
    #[error("{tier} frame {index} is already loaded")]
    AlreadyLoaded { tier: Tier, index: usize },

    /// The index does not name a frame of the catalog.
    #[error("frame {index} is outside the catalog of {len} frames")]
    OutOfRange { index: usize, len: usize },
}

impl LoadError {
    pub fn is_already_loaded(&self) -> bool {
        matches!(self, Self::AlreadyLoaded { .. })
    }
}

/// Library error type for sequence setup and playback.
#[derive(Debug, Error)]
pub enum Error {
    /// A catalog must hold at least one frame.
    #[error("image catalog is empty")]
    EmptyCatalog,

    /// Startup preload had failures and the configuration asked to abort on them.
    #[error("{failed} of {requested} preload fetches failed")]
    PreloadFailed { failed: usize, requested: usize },

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),
}
