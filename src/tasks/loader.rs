use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use crate::events::LoadedImage;
use crate::host::ImageFetcher;

/// Fetches frames from the local filesystem.
///
/// Accepts `file://` URLs and plain paths; relative paths resolve against
/// `root` when one is set. Decoding runs on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf> {
        let raw = match url.split_once("://") {
            Some(("file", rest)) => rest,
            Some((scheme, _)) => bail!("unsupported url scheme {scheme:?} in {url}"),
            None => url,
        };
        let path = Path::new(raw);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

impl ImageFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<LoadedImage>> {
        load_file(self.resolve(url), url.to_string()).boxed()
    }
}

async fn load_file(resolved: Result<PathBuf>, url: String) -> Result<LoadedImage> {
    let path = resolved?;
    let decode_path = path.clone();
    let rgba = tokio::task::spawn_blocking(move || decode_rgba8_apply_exif(&decode_path))
        .await
        .map_err(|err| anyhow!("decode task failed: {err}"))?
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let (width, height) = rgba.dimensions();
    debug!(%url, width, height, "decoded frame");
    Ok(LoadedImage {
        url,
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

// Decodes to RGBA8 and applies EXIF orientation when present; missing
// metadata keeps the stored orientation.
fn decode_rgba8_apply_exif(path: &Path) -> Result<image::RgbaImage> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let img = img.to_rgba8();

    Ok(match read_orientation(path).unwrap_or(1) {
        2 => image::imageops::flip_horizontal(&img),
        3 => image::imageops::rotate180(&img),
        4 => image::imageops::flip_vertical(&img),
        // transpose
        5 => image::imageops::flip_horizontal(&image::imageops::rotate90(&img)),
        6 => image::imageops::rotate90(&img),
        // transverse
        7 => image::imageops::flip_horizontal(&image::imageops::rotate270(&img)),
        8 => image::imageops::rotate270(&img),
        _ => img,
    })
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    debug!(orientation, path = %path.display(), "exif orientation");
    Some(orientation)
}
