//! Top-level playback state machine.
//!
//! `Initializing -> Preloading -> Ready`. Host signals are only acted upon in
//! `Ready`; frame loads run on a [`JoinSet`] so the signal loop never blocks on
//! the network, and every finished load is checked against the frame that is
//! current *now* before it is drawn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::select;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::{FetchOutcome, ImageCache};
use crate::catalog::{Catalog, Tier};
use crate::config::Configuration;
use crate::error::Error;
use crate::events::{HostSignal, LoadedImage, PlaybackEvent, PlaybackState, Viewport};
use crate::host::{DrawSurface, ImageFetcher};
use crate::processing::frame_index::{resolve_frame_index, story_height};
use crate::processing::layout::cover_crop;
use crate::tasks::scheduler::LoadScheduler;

// Parks the high-resolution timer while nothing is scheduled.
const IDLE_TIMER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPurpose {
    Display,
    Upgrade,
}

struct LoadOutcome {
    index: usize,
    tier: Tier,
    result: FetchOutcome,
}

struct DrawnFrame {
    index: usize,
    tier: Tier,
    image: Arc<LoadedImage>,
}

struct Playback<S> {
    cfg: Configuration,
    scheduler: Arc<LoadScheduler>,
    surface: S,
    events: Sender<PlaybackEvent>,
    viewport: Viewport,
    scroll_offset: f64,
    current: usize,
    drawn: Option<DrawnFrame>,
    loads: JoinSet<LoadOutcome>,
    in_flight: HashMap<task::Id, (usize, Tier)>,
}

impl<S: DrawSurface> Playback<S> {
    fn frame_count(&self) -> usize {
        self.scheduler.cache().catalog().len()
    }

    fn resolve(&self) -> usize {
        resolve_frame_index(
            self.scroll_offset,
            self.viewport.height as f64,
            self.cfg.px_per_img,
            self.frame_count(),
        )
    }

    async fn emit(&mut self, event: PlaybackEvent) {
        let _ = self.events.send(event).await;
    }

    async fn enter(&mut self, state: PlaybackState) {
        info!(?state, "playback state");
        self.emit(PlaybackEvent::StateChanged(state)).await;
    }

    async fn measure(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.surface.resize(viewport.surface_size());
        let height = story_height(self.frame_count(), self.cfg.px_per_img, viewport.height as f64);
        self.emit(PlaybackEvent::StoryHeight(height)).await;
    }

    fn draw(&mut self, image: &LoadedImage) -> bool {
        let Some(crop) = cover_crop(image.width, image.height, self.surface.size()) else {
            debug!(url = %image.url, "degenerate image or surface; skipping draw");
            return false;
        };
        match self.surface.draw_cropped(image, crop.source, crop.dest) {
            Ok(()) => true,
            Err(err) => {
                warn!(url = %image.url, error = %err, "draw failed");
                false
            }
        }
    }

    fn is_drawn(&self, index: usize, tier: Tier) -> bool {
        self.drawn
            .as_ref()
            .is_some_and(|d| d.index == index && d.tier >= tier)
    }

    /// High resolution when it is already cached, otherwise low.
    fn display_tier(&self, index: usize) -> Tier {
        if self.scheduler.cache().get(Tier::High, index).is_some() {
            Tier::High
        } else {
            Tier::Low
        }
    }

    fn spawn_load(&mut self, index: usize, tier: Tier, purpose: LoadPurpose) {
        if self.is_drawn(index, tier) || self.in_flight.values().any(|&key| key == (index, tier)) {
            return;
        }
        let scheduler = Arc::clone(&self.scheduler);
        let handle = self.loads.spawn(async move {
            let result = match purpose {
                LoadPurpose::Display => scheduler.load_for_display(index, tier).await,
                LoadPurpose::Upgrade => scheduler.upgrade(index).await,
            };
            LoadOutcome {
                index,
                tier,
                result,
            }
        });
        self.in_flight.insert(handle.id(), (index, tier));
    }

    /// Draws a loaded frame if it is still the one the scroll position wants.
    async fn present(&mut self, index: usize, tier: Tier, image: Arc<LoadedImage>) {
        if index != self.current {
            debug!(index, current = self.current, %tier, "stale frame; not drawn");
            return;
        }
        if self.is_drawn(index, tier) {
            return;
        }
        if !self.draw(&image) {
            return;
        }
        if self.cfg.debug {
            info!(index, %tier, width = image.width, height = image.height, "frame drawn");
        } else {
            debug!(index, %tier, "frame drawn");
        }
        self.drawn = Some(DrawnFrame { index, tier, image });
        self.emit(PlaybackEvent::FrameUpdated(index)).await;
    }

    async fn finish_load(&mut self, joined: Result<(task::Id, LoadOutcome), JoinError>) {
        let LoadOutcome {
            index,
            tier,
            result,
        } = match joined {
            Ok((id, outcome)) => {
                self.in_flight.remove(&id);
                outcome
            }
            Err(err) => {
                let key = self.in_flight.remove(&err.id());
                warn!(?key, error = %err, "frame load task failed");
                return;
            }
        };
        match result {
            Ok(image) => self.present(index, tier, image).await,
            Err(err) => warn!(index, %tier, error = %err, "frame unavailable; retrying on next scroll"),
        }
    }

    fn on_scroll(&mut self, offset: f64) {
        self.scroll_offset = offset;
        self.current = self.resolve();
        let index = self.current;
        self.spawn_load(index, self.display_tier(index), LoadPurpose::Display);
    }

    async fn on_resize(&mut self, viewport: Viewport) {
        self.measure(viewport).await;
        let index = self.resolve();
        if index != self.current {
            self.current = index;
            self.spawn_load(index, self.display_tier(index), LoadPurpose::Display);
        }
        // a frame still loading for the current index is drawn when it lands
        let redraw = self
            .drawn
            .as_ref()
            .filter(|d| d.index == index)
            .map(|d| Arc::clone(&d.image));
        if let Some(image) = redraw {
            self.draw(&image);
        }
        self.emit(PlaybackEvent::ResizeCompleted).await;
    }

    fn on_settled(&mut self) {
        let index = self.current;
        debug!(index, "scroll settled; requesting high resolution");
        self.spawn_load(index, Tier::High, LoadPurpose::Upgrade);
    }

    async fn handle_signal(&mut self, signal: HostSignal) {
        match signal {
            HostSignal::Scroll { offset } => self.on_scroll(offset),
            HostSignal::Resize(viewport) => self.on_resize(viewport).await,
        }
    }
}

/// Runs scroll-driven playback until `cancel` fires or the host closes
/// `signals`.
///
/// The catalog is built from `cfg`. `viewport` and `scroll_offset` are the
/// host's values at start-up. Frames are fetched through `fetcher` and drawn
/// onto `surface`; lifecycle notifications go to `events`.
#[instrument(skip_all, fields(first = cfg.image_count_first, last = cfg.image_count_last))]
#[allow(clippy::too_many_arguments)]
pub async fn run<S: DrawSurface>(
    cfg: Configuration,
    fetcher: Arc<dyn ImageFetcher>,
    surface: S,
    viewport: Viewport,
    scroll_offset: f64,
    mut signals: Receiver<HostSignal>,
    events: Sender<PlaybackEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let catalog = Catalog::from_config(&cfg).context("failed to build image catalog")?;
    let cache = Arc::new(ImageCache::new(Arc::new(catalog), fetcher));
    let scheduler = Arc::new(LoadScheduler::new(cache, cfg.load_policy()));
    let mut playback = Playback {
        cfg,
        scheduler: Arc::clone(&scheduler),
        surface,
        events,
        viewport,
        scroll_offset,
        current: 0,
        drawn: None,
        loads: JoinSet::new(),
        in_flight: HashMap::new(),
    };

    playback.enter(PlaybackState::Initializing).await;
    playback.measure(viewport).await;

    playback.enter(PlaybackState::Preloading).await;
    let report = select! {
        _ = cancel.cancelled() => return Ok(()),
        report = scheduler.preload() => report,
    };
    info!(
        requested = report.requested,
        loaded = report.loaded,
        failed = report.failures.len(),
        "preload finished"
    );
    if !report.is_complete() && playback.cfg.abort_on_preload_failure {
        return Err(Error::PreloadFailed {
            failed: report.failures.len(),
            requested: report.requested,
        })
        .context("aborting playback");
    }

    // Signals that queued up during preload only contribute their latest values.
    while let Ok(signal) = signals.try_recv() {
        match signal {
            HostSignal::Scroll { offset } => playback.scroll_offset = offset,
            HostSignal::Resize(viewport) => playback.measure(viewport).await,
        }
    }

    playback.enter(PlaybackState::Ready).await;
    playback.current = playback.resolve();
    let first = playback.current;
    match scheduler.load_for_display(first, Tier::Low).await {
        Ok(image) => playback.present(first, Tier::Low, image).await,
        Err(err) => warn!(index = first, error = %err, "first frame unavailable"),
    }
    playback.emit(PlaybackEvent::Complete).await;

    let background_cancel = cancel.child_token();
    let background = tokio::spawn(
        Arc::clone(&scheduler).run_background(playback.cfg.interval_timeout, background_cancel.clone()),
    );

    let high_res_delay = playback.cfg.high_res_load_delay;
    let high_res_timer = sleep_until(Instant::now() + high_res_delay);
    tokio::pin!(high_res_timer);
    let mut high_res_armed = true;

    loop {
        select! {
            _ = cancel.cancelled() => break,

            maybe_signal = signals.recv() => {
                let Some(signal) = maybe_signal else {
                    debug!("host signal channel closed");
                    break;
                };
                let scrolled = matches!(signal, HostSignal::Scroll { .. });
                playback.handle_signal(signal).await;
                if scrolled {
                    high_res_timer.as_mut().reset(Instant::now() + high_res_delay);
                    high_res_armed = true;
                }
            }

            Some(joined) = playback.loads.join_next_with_id() => {
                playback.finish_load(joined).await;
            }

            _ = &mut high_res_timer, if high_res_armed => {
                high_res_armed = false;
                high_res_timer.as_mut().reset(Instant::now() + IDLE_TIMER);
                playback.on_settled();
            }
        }
    }

    background_cancel.cancel();
    if let Err(err) = background.await {
        warn!(error = %err, "background fill task failed");
    }
    playback.loads.shutdown().await;
    Ok(())
}
