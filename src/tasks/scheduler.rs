//! Loading policies layered over [`ImageCache`].
//!
//! - Preload: the first share of the catalog, all at once, before playback.
//! - Display load: the frame the scroll position asks for, then a look-ahead.
//! - Look-ahead: a bounded window after the displayed frame. Chains run one
//!   at a time; a new chain waits for the previous one to settle.
//! - Background fill: a few frames per tick while no look-ahead runs, until
//!   the catalog is exhausted.
//! - Upgrade: the high-resolution version of a settled frame.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{FetchOutcome, ImageCache};
use crate::catalog::Tier;
use crate::config::LoadPolicy;
use crate::error::LoadError;

type ForwardChain = Shared<BoxFuture<'static, ()>>;

/// Number of indices `i >= 0` with `i < frame_count * fraction`.
fn share_of(frame_count: usize, fraction: f64) -> usize {
    let threshold = frame_count as f64 * fraction;
    if threshold <= 0.0 {
        return 0;
    }
    (threshold.ceil() as usize).min(frame_count)
}

#[derive(Debug, Default)]
pub struct PreloadReport {
    pub requested: usize,
    pub loaded: usize,
    pub failures: Vec<LoadError>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundStep {
    /// A look-ahead chain is queued or running; nothing was fetched.
    Skipped,
    /// Fetched `loaded` frames; more remain.
    Filled { loaded: usize },
    /// The cursor passed the last frame; the fill is over.
    Complete,
    /// A fetch failed; the fill stops.
    Halted,
}

pub struct LoadScheduler {
    cache: Arc<ImageCache>,
    policy: LoadPolicy,
    forward_chain: Mutex<Option<ForwardChain>>,
    /// Chains with a non-empty window that are queued or running.
    forward_pending: AtomicUsize,
    /// Next index the background fill will visit.
    background_cursor: AtomicUsize,
}

impl LoadScheduler {
    pub fn new(cache: Arc<ImageCache>, policy: LoadPolicy) -> Self {
        Self {
            cache,
            policy,
            forward_chain: Mutex::new(None),
            forward_pending: AtomicUsize::new(0),
            background_cursor: AtomicUsize::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    fn frame_count(&self) -> usize {
        self.cache.catalog().len()
    }

    /// Fetches the low tier of every frame below `N * preload_fraction`
    /// concurrently. Failures are collected, not propagated.
    pub async fn preload(&self) -> PreloadReport {
        let requested = share_of(self.frame_count(), self.policy.preload_fraction);
        self.background_cursor.fetch_max(requested, Ordering::SeqCst);
        if requested == 0 {
            return PreloadReport::default();
        }
        debug!(requested, "preloading low-resolution frames");

        let results = join_all((0..requested).map(|index| self.cache.fetch(Tier::Low, index, false))).await;
        let mut report = PreloadReport {
            requested,
            ..PreloadReport::default()
        };
        for result in results {
            match result {
                Ok(_) => report.loaded += 1,
                Err(err) => {
                    warn!(error = %err, "preload fetch failed");
                    report.failures.push(err);
                }
            }
        }
        report
    }

    /// Loads `index` at `tier` for drawing. On success a look-ahead chain is
    /// queued behind any running one; the caller does not wait for it.
    pub async fn load_for_display(self: &Arc<Self>, index: usize, tier: Tier) -> FetchOutcome {
        let image = self.cache.fetch(tier, index, false).await?;
        drop(self.look_ahead(index));
        Ok(image)
    }

    /// High-resolution fetch for a frame the viewer settled on.
    pub async fn upgrade(&self, index: usize) -> FetchOutcome {
        self.cache.fetch(Tier::High, index, false).await
    }

    /// Queues a look-ahead for the frames after `index` and returns a future
    /// that resolves once that chain has settled.
    ///
    /// The chain runs on its own task, so dropping the returned future does
    /// not stop it. A chain with frames to fetch counts as active from the
    /// moment it is queued.
    pub fn look_ahead(self: &Arc<Self>, index: usize) -> impl Future<Output = ()> + Send + 'static {
        let window = self.forward_window(index);
        let pending = (!window.is_empty()).then(|| ForwardPending::new(Arc::clone(self)));
        let mut slot = self.chain_slot();
        let previous = slot.take();
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _pending = pending;
            if let Some(previous) = previous {
                previous.await;
            }
            scheduler.run_forward(window).await;
        });
        let chain: ForwardChain = async move {
            if let Err(err) = handle.await {
                warn!(index, error = %err, "look-ahead task failed");
            }
        }
        .boxed()
        .shared();
        *slot = Some(chain.clone());
        chain
    }

    /// Resolves once the most recently queued look-ahead chain has settled.
    pub async fn forward_settled(&self) {
        let latest = self.chain_slot().clone();
        if let Some(chain) = latest {
            chain.await;
        }
    }

    pub fn forward_active(&self) -> bool {
        self.forward_pending.load(Ordering::SeqCst) > 0
    }

    /// Frames after `index` that a look-ahead from it covers.
    fn forward_window(&self, index: usize) -> Range<usize> {
        let frame_count = self.frame_count();
        let window = share_of(frame_count, self.policy.forward_fraction);
        index.saturating_add(1)..index.saturating_add(window).min(frame_count)
    }

    async fn run_forward(&self, window: Range<usize>) {
        if window.is_empty() {
            return;
        }
        let (from, to) = (window.start, window.end - 1);
        debug!(from, to, "look-ahead started");
        let results = join_all(window.map(|i| self.cache.fetch(Tier::Low, i, false))).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            debug!(from, to, failed, "look-ahead finished with failures");
        }
    }

    /// One tick of the idle background fill.
    ///
    /// Walks the background cursor forward, fetching up to
    /// `floor(N * interval_fraction)` (at least one) frames one at a time.
    /// Frames already cached are skipped without counting against the batch.
    /// The step yields as soon as a look-ahead chain is queued.
    pub async fn background_step(&self) -> BackgroundStep {
        let frame_count = self.frame_count();
        if self.background_cursor.load(Ordering::SeqCst) >= frame_count {
            return BackgroundStep::Complete;
        }

        let batch = ((frame_count as f64 * self.policy.interval_fraction).floor() as usize).max(1);
        let mut loaded = 0;
        while loaded < batch {
            if self.forward_active() {
                debug!(loaded, "background fill yielding to look-ahead");
                return match loaded {
                    0 => BackgroundStep::Skipped,
                    loaded => BackgroundStep::Filled { loaded },
                };
            }
            let index = self.background_cursor.load(Ordering::SeqCst);
            if index >= frame_count {
                break;
            }
            match self.cache.fetch(Tier::Low, index, true).await {
                Ok(_) => loaded += 1,
                Err(err) if err.is_already_loaded() => {}
                Err(err) => {
                    warn!(index, error = %err, "background fill halted");
                    return BackgroundStep::Halted;
                }
            }
            self.background_cursor.fetch_max(index + 1, Ordering::SeqCst);
        }

        if self.background_cursor.load(Ordering::SeqCst) >= frame_count {
            BackgroundStep::Complete
        } else {
            BackgroundStep::Filled { loaded }
        }
    }

    /// Runs [`background_step`](Self::background_step) every `period` until the
    /// catalog is exhausted, a fetch fails, or `cancel` fires.
    pub async fn run_background(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; the fill starts one period in
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.background_step().await {
                        BackgroundStep::Skipped => debug!("background fill deferred to look-ahead"),
                        BackgroundStep::Filled { loaded } => debug!(loaded, "background fill tick"),
                        BackgroundStep::Complete => {
                            info!("background fill complete");
                            break;
                        }
                        BackgroundStep::Halted => break,
                    }
                }
            }
        }
    }

    fn chain_slot(&self) -> MutexGuard<'_, Option<ForwardChain>> {
        self.forward_chain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// Marks a queued look-ahead chain until its task finishes or is dropped.
struct ForwardPending(Arc<LoadScheduler>);

impl ForwardPending {
    fn new(scheduler: Arc<LoadScheduler>) -> Self {
        scheduler.forward_pending.fetch_add(1, Ordering::SeqCst);
        Self(scheduler)
    }
}

impl Drop for ForwardPending {
    fn drop(&mut self) {
        self.0.forward_pending.fetch_sub(1, Ordering::SeqCst);
    }
}
