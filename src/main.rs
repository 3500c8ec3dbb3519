//! Binary entrypoint for scroll-sequence.
//!
//! Plays a configured frame sequence onto an in-memory surface, driven by host
//! signals read line-by-line from stdin:
//!
//! ```text
//! scroll 1350
//! resize 1024x768
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use scroll_sequence::config::Configuration;
use scroll_sequence::events::{HostSignal, PlaybackEvent, Viewport};
use scroll_sequence::host::ImageFetcher;
use scroll_sequence::render::raster::RasterSurface;
use scroll_sequence::tasks::loader::FileFetcher;
use scroll_sequence::tasks::playback;

#[derive(Debug, Parser)]
#[command(
    name = "scroll-sequence",
    version,
    about = "Scroll-scrubbed image sequence player"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Viewport size as WIDTHxHEIGHT
    #[arg(long, value_name = "WxH", default_value = "1280x720", value_parser = parse_viewport)]
    viewport: Viewport,
    /// Scroll offset (px) at start-up
    #[arg(long, value_name = "PX", default_value_t = 0.0)]
    scroll: f64,
    /// Write the surface to this PNG after every draw
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Resolve relative frame URLs against this directory
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn parse_viewport(raw: &str) -> Result<Viewport, String> {
    let (w, h) = raw
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw:?}"))?;
    let width = w.trim().parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let height = h.trim().parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
    Ok(Viewport::new(width, height))
}

fn parse_signal(line: &str) -> Result<Option<HostSignal>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (command, arg) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match command {
        "scroll" => {
            let offset = arg
                .trim()
                .parse()
                .with_context(|| format!("bad scroll offset {arg:?}"))?;
            Ok(Some(HostSignal::Scroll { offset }))
        }
        "resize" => {
            let viewport = parse_viewport(arg.trim()).map_err(|e| anyhow!(e))?;
            Ok(Some(HostSignal::Resize(viewport)))
        }
        other => bail!("unknown command {other:?}; expected `scroll <px>` or `resize <w>x<h>`"),
    }
}

async fn forward_stdin(to_playback: Sender<HostSignal>, cancel: CancellationToken) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    tracing::info!("stdin closed; initiating shutdown");
                    break;
                };
                match parse_signal(&line) {
                    Ok(Some(signal)) => {
                        if to_playback.send(signal).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => tracing::warn!("ignoring input line: {err:#}"),
                }
            }
        }
    }
    Ok(())
}

fn init_tracing(verbosity: u8, debug: bool) -> Result<()> {
    // map -v (or `debug: true`) to the crate's level
    let level = match (verbosity, debug) {
        (0, false) => Level::INFO,
        (0 | 1, _) => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("scroll_sequence={level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        viewport,
        scroll,
        output,
        root,
        verbose,
    } = Args::parse();

    let cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?
        .validated()
        .context("invalid configuration values")?;
    init_tracing(verbose, cfg.debug)?;
    tracing::info!(
        "Loaded configuration from {}:\n{:#?}",
        config.display(),
        cfg
    );

    let (signal_tx, signal_rx) = mpsc::channel::<HostSignal>(64); // stdin -> Playback
    let (event_tx, mut event_rx) = mpsc::channel::<PlaybackEvent>(64); // Playback -> log
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let input = tokio::spawn(forward_stdin(signal_tx, cancel.clone()));
    let reporter = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                PlaybackEvent::FrameUpdated(index) => tracing::debug!(index, "frame updated"),
                PlaybackEvent::Complete => tracing::info!("initial frames loaded"),
                other => tracing::debug!(event = ?other, "playback event"),
            }
        }
    });

    let fetcher: Arc<dyn ImageFetcher> = match root {
        Some(root) => Arc::new(FileFetcher::with_root(root)),
        None => Arc::new(FileFetcher::new()),
    };
    let mut surface = RasterSurface::new(viewport.surface_size());
    if let Some(path) = output {
        surface = surface.with_output(path);
    }

    let result = playback::run(
        cfg,
        fetcher,
        surface,
        viewport,
        scroll,
        signal_rx,
        event_tx,
        cancel.clone(),
    )
    .await
    .context("playback failed");

    cancel.cancel();
    match input.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("input task error: {e:?}"),
        Err(e) => tracing::error!("join error: {e}"),
    }
    let _ = reporter.await;
    result
}
