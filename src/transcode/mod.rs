//! Audio encoding module
//!
//! - AAC encoder bound to the output stream
//! - S16 → encoder-format conversion (no rate change)
//! - The FFmpeg `MediaBackend` tying both to the output container

pub mod backend;
pub mod encoder;
pub mod resampler;
