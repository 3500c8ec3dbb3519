#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use futures::FutureExt;
use futures::future::BoxFuture;
use scroll_sequence::config::Configuration;
use scroll_sequence::events::LoadedImage;
use scroll_sequence::host::{DrawSurface, ImageFetcher};
use scroll_sequence::processing::layout::{Rect, SurfaceSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Start(String),
    End(String),
}

/// In-memory image source: counts transport calls, records their order, and
/// can delay, fail or panic on specific URLs.
#[derive(Default)]
pub struct ScriptedFetcher {
    latency: Duration,
    slow: HashMap<String, Duration>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    log: Arc<Mutex<Vec<Transport>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn slow(mut self, url: &str, latency: Duration) -> Self {
        self.slow.insert(url.to_string(), latency);
        self
    }

    pub fn failing(self, url: &str) -> Self {
        self.failing.lock().unwrap().insert(url.to_string());
        self
    }

    /// Panics on the first request for `url`, before any transport starts.
    pub fn panicking_once(self, url: &str) -> Self {
        self.panicking.lock().unwrap().insert(url.to_string());
        self
    }

    pub fn heal(&self, url: &str) {
        self.failing.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|t| matches!(t, Transport::Start(u) if u == url))
            .count()
    }

    pub fn log(&self) -> Vec<Transport> {
        self.log.lock().unwrap().clone()
    }
}

impl ImageFetcher for ScriptedFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<LoadedImage>> {
        if self.panicking.lock().unwrap().remove(url) {
            panic!("fetcher blew up on {url}");
        }
        let url = url.to_string();
        let latency = self.slow.get(&url).copied().unwrap_or(self.latency);
        let fail = self.failing.lock().unwrap().contains(&url);
        let log = Arc::clone(&self.log);
        self.calls.fetch_add(1, Ordering::SeqCst);
        async move {
            log.lock().unwrap().push(Transport::Start(url.clone()));
            tokio::time::sleep(latency).await;
            log.lock().unwrap().push(Transport::End(url.clone()));
            if fail {
                bail!("404 for {url}");
            }
            Ok(LoadedImage {
                url,
                width: 400,
                height: 300,
                pixels: vec![0; 400 * 300 * 4],
            })
        }
        .boxed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub url: String,
    pub src: Rect,
    pub dest: Rect,
}

/// Surface that remembers every draw; clones share the same record.
#[derive(Clone)]
pub struct RecordingSurface {
    size: Arc<Mutex<SurfaceSize>>,
    draws: Arc<Mutex<Vec<Draw>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            size: Arc::new(Mutex::new(SurfaceSize::new(0, 0))),
            draws: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn draws(&self) -> Vec<Draw> {
        self.draws.lock().unwrap().clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.draws.lock().unwrap().last().map(|d| d.url.clone())
    }

    pub fn current_size(&self) -> SurfaceSize {
        *self.size.lock().unwrap()
    }
}

impl DrawSurface for RecordingSurface {
    fn size(&self) -> SurfaceSize {
        self.current_size()
    }

    fn resize(&mut self, size: SurfaceSize) {
        *self.size.lock().unwrap() = size;
    }

    fn draw_cropped(&mut self, image: &LoadedImage, src: Rect, dest: Rect) -> Result<()> {
        self.draws.lock().unwrap().push(Draw {
            url: image.url.clone(),
            src,
            dest,
        });
        Ok(())
    }
}

/// Frames `0..count` named `low/f<i>.jpg` and `high/f<i>.jpg`.
pub fn sequence(count: u32) -> Configuration {
    Configuration {
        image_low_res_dir: "low".into(),
        image_high_res_dir: "high".into(),
        image_prefix: "f".into(),
        image_count_first: 0,
        image_count_last: count - 1,
        ..Configuration::default()
    }
}

pub fn low(index: usize) -> String {
    format!("low/f{index}.jpg")
}

pub fn high(index: usize) -> String {
    format!("high/f{index}.jpg")
}
