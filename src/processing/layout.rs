#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn full_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f64, self.height as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Source window of the image and the surface rectangle it is drawn into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverCrop {
    pub source: Rect,
    pub dest: Rect,
}

// Below this the first adjustment counts as "no adjustment"; float noise in
// `image * ratio` must not mask a short second axis.
const ADJUST_EPSILON: f64 = 1e-14;

/// Computes a cover fit: the image is scaled to the smallest size that covers
/// the whole surface without changing its aspect ratio, then center-cropped.
///
/// Returns `None` for zero-sized images or surfaces; there is nothing to draw.
pub fn cover_crop(image_w: u32, image_h: u32, surface: SurfaceSize) -> Option<CoverCrop> {
    if image_w == 0 || image_h == 0 || surface.is_empty() {
        return None;
    }
    let iw = image_w as f64;
    let ih = image_h as f64;
    let w = surface.width as f64;
    let h = surface.height as f64;

    let ratio = (w / iw).min(h / ih);
    let mut nw = iw * ratio;
    let mut nh = ih * ratio;
    let mut adjust = 1.0;
    if nw < w {
        adjust = w / nw;
    }
    if (adjust - 1.0).abs() < ADJUST_EPSILON && nh < h {
        adjust = h / nh;
    }
    nw *= adjust;
    nh *= adjust;

    // invert the scale to find the visible window in image space
    let mut cw = iw / (nw / w);
    let mut ch = ih / (nh / h);
    let cx = ((iw - cw) * 0.5).max(0.0);
    let cy = ((ih - ch) * 0.5).max(0.0);
    cw = cw.min(iw);
    ch = ch.min(ih);

    Some(CoverCrop {
        source: Rect::new(cx, cy, cw, ch),
        dest: surface.full_rect(),
    })
}
