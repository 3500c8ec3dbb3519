use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, ensure};
use fast_image_resize as fir;
use image::RgbaImage;
use tracing::debug;

use crate::events::LoadedImage;
use crate::host::DrawSurface;
use crate::processing::layout::{Rect, SurfaceSize};

/// In-memory RGBA canvas. Optionally writes itself to `output` after each draw.
pub struct RasterSurface {
    canvas: RgbaImage,
    output: Option<PathBuf>,
    resizer: fir::Resizer,
}

impl RasterSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            canvas: RgbaImage::new(size.width, size.height),
            output: None,
            resizer: fir::Resizer::new(),
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    fn scale_region(&mut self, image: &LoadedImage, src: Rect, width: u32, height: u32) -> Result<RgbaImage> {
        let src_view = fir::images::ImageRef::new(
            image.width,
            image.height,
            &image.pixels,
            fir::PixelType::U8x4,
        )
        .with_context(|| format!("failed to create source view for {}", image.url))?;
        let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .crop(src.x, src.y, src.width, src.height)
            .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
        self.resizer
            .resize(&src_view, &mut dst_image, Some(&options))
            .with_context(|| format!("frame resize failed for {}", image.url))?;
        RgbaImage::from_raw(width, height, dst_image.into_vec())
            .ok_or_else(|| anyhow!("failed to construct resized RGBA image"))
    }
}

impl DrawSurface for RasterSurface {
    fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.canvas.width(), self.canvas.height())
    }

    fn resize(&mut self, size: SurfaceSize) {
        if self.size() != size {
            self.canvas = RgbaImage::new(size.width, size.height);
        }
    }

    fn draw_cropped(&mut self, image: &LoadedImage, src: Rect, dest: Rect) -> Result<()> {
        let width = dest.width.round() as u32;
        let height = dest.height.round() as u32;
        ensure!(
            width > 0 && height > 0,
            "destination rectangle is empty: {dest:?}"
        );
        let scaled = self.scale_region(image, src, width, height)?;
        image::imageops::replace(
            &mut self.canvas,
            &scaled,
            dest.x.round() as i64,
            dest.y.round() as i64,
        );
        if let Some(path) = &self.output {
            self.canvas
                .save(path)
                .with_context(|| format!("failed to write frame to {}", path.display()))?;
            debug!(url = %image.url, path = %path.display(), "frame written");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::layout::cover_crop;

    fn striped(width: u32, height: u32) -> LoadedImage {
        // left half red, right half blue
        let img = RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        LoadedImage {
            url: "mem://striped".into(),
            width,
            height,
            pixels: img.into_raw(),
        }
    }

    #[test]
    fn cover_draw_fills_whole_canvas() {
        let mut surface = RasterSurface::new(SurfaceSize::new(40, 40));
        let image = striped(80, 40);
        let crop = cover_crop(image.width, image.height, surface.size()).unwrap();
        surface
            .draw_cropped(&image, crop.source, crop.dest)
            .unwrap();

        let canvas = surface.canvas();
        assert_eq!(canvas.dimensions(), (40, 40));
        assert_eq!(canvas.get_pixel(2, 20).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(37, 20).0, [0, 0, 255, 255]);
        assert!(canvas.pixels().all(|p| p.0[3] == 255), "no letterboxing");
    }

    #[test]
    fn resize_replaces_canvas() {
        let mut surface = RasterSurface::new(SurfaceSize::new(4, 4));
        surface.resize(SurfaceSize::new(10, 6));
        assert_eq!(surface.size(), SurfaceSize::new(10, 6));
        assert_eq!(surface.canvas().dimensions(), (10, 6));
    }

    #[test]
    fn writes_output_after_draw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut surface = RasterSurface::new(SurfaceSize::new(8, 8)).with_output(&path);
        let image = striped(16, 16);
        let crop = cover_crop(16, 16, surface.size()).unwrap();
        surface.draw_cropped(&image, crop.source, crop.dest).unwrap();
        let written = image::open(&path).unwrap();
        assert_eq!((written.width(), written.height()), (8, 8));
    }
}
