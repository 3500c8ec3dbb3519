//! Per-tier frame cache with single-flight fetching.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

use crate::catalog::{Catalog, Tier};
use crate::error::LoadError;
use crate::events::LoadedImage;
use crate::host::ImageFetcher;

pub type FetchOutcome = Result<Arc<LoadedImage>, LoadError>;

type PendingFetch = Shared<BoxFuture<'static, FetchOutcome>>;

#[derive(Default)]
struct CacheState {
    low: HashMap<usize, Arc<LoadedImage>>,
    high: HashMap<usize, Arc<LoadedImage>>,
    pending: HashMap<(Tier, usize), PendingFetch>,
}

impl CacheState {
    fn tier(&self, tier: Tier) -> &HashMap<usize, Arc<LoadedImage>> {
        match tier {
            Tier::Low => &self.low,
            Tier::High => &self.high,
        }
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut HashMap<usize, Arc<LoadedImage>> {
        match tier {
            Tier::Low => &mut self.low,
            Tier::High => &mut self.high,
        }
    }
}

/// Loaded frames keyed by `(tier, index)`.
///
/// Entries are written once and never evicted. At most one transport fetch
/// runs per key; concurrent callers share its outcome. A failed fetch leaves
/// no entry behind, so the next caller retries.
pub struct ImageCache {
    catalog: Arc<Catalog>,
    fetcher: Arc<dyn ImageFetcher>,
    state: Mutex<CacheState>,
}

impl ImageCache {
    pub fn new(catalog: Arc<Catalog>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            catalog,
            fetcher,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn get(&self, tier: Tier, index: usize) -> Option<Arc<LoadedImage>> {
        self.state().tier(tier).get(&index).cloned()
    }

    pub fn loaded_count(&self, tier: Tier) -> usize {
        self.state().tier(tier).len()
    }

    /// Number of transport fetches still in flight across both tiers.
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Returns the cached frame, joins an in-flight fetch for it, or starts one.
    ///
    /// With `fail_if_loaded`, a cached entry yields [`LoadError::AlreadyLoaded`]
    /// instead of the image.
    pub async fn fetch(self: &Arc<Self>, tier: Tier, index: usize, fail_if_loaded: bool) -> FetchOutcome {
        let pending = {
            let mut state = self.state();
            if let Some(image) = state.tier(tier).get(&index) {
                if fail_if_loaded {
                    return Err(LoadError::AlreadyLoaded { tier, index });
                }
                return Ok(Arc::clone(image));
            }
            match state.pending.get(&(tier, index)) {
                Some(in_flight) => {
                    debug!(%tier, index, "joining in-flight fetch");
                    in_flight.clone()
                }
                None => {
                    let started = self.start_fetch(tier, index)?;
                    state.pending.insert((tier, index), started.clone());
                    started
                }
            }
        };
        pending.await
    }

    // Caller holds the state lock, so `settle` cannot observe a missing
    // pending entry.
    fn start_fetch(self: &Arc<Self>, tier: Tier, index: usize) -> Result<PendingFetch, LoadError> {
        let url = self
            .catalog
            .url(tier, index)
            .ok_or(LoadError::OutOfRange {
                index,
                len: self.catalog.len(),
            })?
            .to_string();
        debug!(%tier, index, %url, "fetching frame");

        let transport = self.fetcher.fetch(&url);
        let cache = Arc::clone(self);
        let task_url = url.clone();
        let handle = tokio::spawn(async move {
            let result = transport.await;
            cache.settle(tier, index, task_url, result)
        });

        Ok(async move {
            handle.await.unwrap_or_else(|err| {
                Err(LoadError::Fetch {
                    tier,
                    index,
                    url,
                    reason: Arc::new(anyhow!("fetch task failed: {err}")),
                })
            })
        }
        .boxed()
        .shared())
    }

    fn settle(
        &self,
        tier: Tier,
        index: usize,
        url: String,
        result: anyhow::Result<LoadedImage>,
    ) -> FetchOutcome {
        let mut state = self.state();
        state.pending.remove(&(tier, index));
        match result {
            Ok(image) => {
                debug!(%tier, index, width = image.width, height = image.height, "frame cached");
                let stored = state
                    .tier_mut(tier)
                    .entry(index)
                    .or_insert_with(|| Arc::new(image));
                Ok(Arc::clone(stored))
            }
            Err(err) => {
                debug!(%tier, index, %url, error = %err, "frame fetch failed");
                Err(LoadError::Fetch {
                    tier,
                    index,
                    url,
                    reason: Arc::new(err),
                })
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
