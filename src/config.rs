use std::path::Path;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::error::Error;

/// Fractions of the catalog each loading policy works with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadPolicy {
    /// Share of frames fetched before playback starts.
    pub preload_fraction: f64,
    /// Share of frames fetched ahead of the displayed one.
    pub forward_fraction: f64,
    /// Share of frames fetched per background tick.
    pub interval_fraction: f64,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            preload_fraction: Configuration::DEFAULT_PRE_LOADING_PERCENTAGE,
            forward_fraction: Configuration::DEFAULT_FORWARD_LOADING_THRESHOLD,
            interval_fraction: Configuration::DEFAULT_INTERVAL_LOAD_PERCENTAGE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// URL prefix of the high-resolution frames.
    pub image_high_res_dir: String,
    /// URL prefix of the low-resolution frames.
    pub image_low_res_dir: String,
    /// File name stem placed before the frame number.
    pub image_prefix: String,
    /// First frame number (inclusive).
    pub image_count_first: u32,
    /// Last frame number (inclusive).
    pub image_count_last: u32,
    pub image_extension: String,
    /// Zero-pad frame numbers to this many digits; 0 disables padding.
    pub image_number_width: usize,
    /// Scroll distance in pixels per frame.
    pub px_per_img: f64,
    /// Settle time after the last scroll before the high-resolution frame is fetched.
    #[serde(with = "humantime_serde")]
    pub high_res_load_delay: Duration,
    pub pre_loading_percentage: f64,
    pub forward_loading_threshold: f64,
    /// Period of the idle background fill.
    #[serde(with = "humantime_serde")]
    pub interval_timeout: Duration,
    pub interval_load_percentage: f64,
    /// Refuse to start playback when any preload fetch failed.
    pub abort_on_preload_failure: bool,
    pub debug: bool,
}

impl Configuration {
    pub const DEFAULT_PX_PER_IMG: f64 = 27.0;
    pub const DEFAULT_PRE_LOADING_PERCENTAGE: f64 = 0.25;
    pub const DEFAULT_FORWARD_LOADING_THRESHOLD: f64 = 0.25;
    pub const DEFAULT_INTERVAL_LOAD_PERCENTAGE: f64 = 0.02;

    const fn default_high_res_load_delay() -> Duration {
        Duration::from_millis(250)
    }

    const fn default_interval_timeout() -> Duration {
        Duration::from_millis(500)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.px_per_img.is_finite() && self.px_per_img > 0.0,
            "px-per-img must be a positive number"
        );
        ensure!(
            self.image_count_last >= self.image_count_first,
            "image-count-last ({}) must not be below image-count-first ({})",
            self.image_count_last,
            self.image_count_first
        );
        ensure!(
            !self.image_extension.is_empty(),
            "image-extension must not be empty"
        );
        ensure!(
            self.interval_timeout > Duration::ZERO,
            "interval-timeout must be positive"
        );
        for (name, value) in [
            ("pre-loading-percentage", self.pre_loading_percentage),
            ("forward-loading-threshold", self.forward_loading_threshold),
            ("interval-load-percentage", self.interval_load_percentage),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must be within 0.0..=1.0 (got {value})"
            );
        }
        Ok(self)
    }

    pub fn load_policy(&self) -> LoadPolicy {
        LoadPolicy {
            preload_fraction: self.pre_loading_percentage,
            forward_fraction: self.forward_loading_threshold,
            interval_fraction: self.interval_load_percentage,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            image_high_res_dir: String::new(),
            image_low_res_dir: String::new(),
            image_prefix: String::new(),
            image_count_first: 0,
            image_count_last: 0,
            image_extension: "jpg".to_string(),
            image_number_width: 0,
            px_per_img: Self::DEFAULT_PX_PER_IMG,
            high_res_load_delay: Self::default_high_res_load_delay(),
            pre_loading_percentage: Self::DEFAULT_PRE_LOADING_PERCENTAGE,
            forward_loading_threshold: Self::DEFAULT_FORWARD_LOADING_THRESHOLD,
            interval_timeout: Self::default_interval_timeout(),
            interval_load_percentage: Self::DEFAULT_INTERVAL_LOAD_PERCENTAGE,
            abort_on_preload_failure: false,
            debug: false,
        }
    }
}
