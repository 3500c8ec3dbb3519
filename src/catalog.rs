//! The ordered, immutable list of frames making up a sequence.

use std::fmt;

use crate::config::Configuration;
use crate::error::Error;

/// Resolution class of a cached frame image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Low,
    High,
}

impl Tier {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub index: usize,
    pub low_res_url: String,
    pub high_res_url: String,
}

impl FrameDescriptor {
    pub fn url(&self, tier: Tier) -> &str {
        match tier {
            Tier::Low => &self.low_res_url,
            Tier::High => &self.high_res_url,
        }
    }
}

/// Frames `0..len()`, built once and never mutated.
#[derive(Debug, Clone)]
pub struct Catalog {
    frames: Vec<FrameDescriptor>,
}

impl Catalog {
    pub fn new(frames: Vec<FrameDescriptor>) -> Result<Self, Error> {
        if frames.is_empty() {
            return Err(Error::EmptyCatalog);
        }
        Ok(Self { frames })
    }

    /// Expands the configured numbering range into one descriptor per frame.
    pub fn from_config(cfg: &Configuration) -> Result<Self, Error> {
        let first = cfg.image_count_first;
        let last = cfg.image_count_last;
        if last < first {
            return Err(Error::EmptyCatalog);
        }
        let width = cfg.image_number_width;
        let frames = (first..=last)
            .enumerate()
            .map(|(index, number)| {
                let file = format!(
                    "{}{:0width$}.{}",
                    cfg.image_prefix, number, cfg.image_extension
                );
                FrameDescriptor {
                    index,
                    low_res_url: join_url(&cfg.image_low_res_dir, &file),
                    high_res_url: join_url(&cfg.image_high_res_dir, &file),
                }
            })
            .collect();
        Self::new(frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&FrameDescriptor> {
        self.frames.get(index)
    }

    pub fn url(&self, tier: Tier, index: usize) -> Option<&str> {
        self.get(index).map(|frame| frame.url(tier))
    }
}

fn join_url(dir: &str, file: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        format!("{dir}{file}")
    } else {
        format!("{dir}/{file}")
    }
}
