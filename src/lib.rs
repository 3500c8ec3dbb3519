pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod processing {
    pub mod frame_index;
    pub mod layout;
}
pub mod render {
    pub mod raster;
}
pub mod tasks {
    pub mod loader;
    pub mod playback;
    pub mod scheduler;
}
