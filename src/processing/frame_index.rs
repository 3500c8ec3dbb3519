/// Maps a scroll offset to the frame it should show.
///
/// The result is clamped into `0..frame_count` and is non-decreasing in
/// `scroll_offset`. `pitch` must be positive; configuration validation rejects
/// anything else.
pub fn resolve_frame_index(
    scroll_offset: f64,
    viewport_height: f64,
    pitch: f64,
    frame_count: usize,
) -> usize {
    let last = frame_count.saturating_sub(1);
    let raw = ((scroll_offset + viewport_height) / pitch - viewport_height / pitch).floor();
    // NaN and negatives land on the first frame
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    if raw >= last as f64 {
        return last;
    }
    raw as usize
}

/// Scrollable height that makes every frame reachable: one pitch per frame plus
/// a final viewport.
pub fn story_height(frame_count: usize, pitch: f64, viewport_height: f64) -> f64 {
    frame_count as f64 * pitch + viewport_height
}
