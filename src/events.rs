use crate::processing::layout::SurfaceSize;

/// Decoded RGBA8 pixels of one frame together with its intrinsic size.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn surface_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }
}

/// Inbound notifications from the host page.
#[derive(Debug, Clone, PartialEq)]
pub enum HostSignal {
    Scroll { offset: f64 },
    Resize(Viewport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Initializing,
    Preloading,
    Ready,
}

/// Outbound lifecycle notifications for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StateChanged(PlaybackState),
    /// Height the scroll container must have so every frame is reachable.
    StoryHeight(f64),
    /// A frame was actually drawn to the surface.
    FrameUpdated(usize),
    ResizeCompleted,
    /// Emitted once, after the preload batch and the first draw.
    Complete,
}
