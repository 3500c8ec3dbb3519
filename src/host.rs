//! Collaborators the host environment provides to the playback core.

use anyhow::Result;
use futures::future::BoxFuture;

use crate::events::LoadedImage;
use crate::processing::layout::{Rect, SurfaceSize};

/// Turns a frame URL into decoded pixels.
///
/// The returned future must not borrow `self`: the cache drives it on a
/// spawned task so the transport fetch outlives any single caller.
pub trait ImageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<LoadedImage>>;
}

/// A 2D target that can draw a cropped region of an image.
pub trait DrawSurface: Send + 'static {
    fn size(&self) -> SurfaceSize;

    fn resize(&mut self, size: SurfaceSize);

    /// Draws `src` (image space) scaled into `dest` (surface space).
    fn draw_cropped(&mut self, image: &LoadedImage, src: Rect, dest: Rect) -> Result<()>;
}
