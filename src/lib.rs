//! Raw PCM → AAC/M4A conversion
//!
//! Converts headerless 16-bit signed little-endian mono PCM at 44100 Hz
//! into an AAC-encoded M4A file using FFmpeg. Encoding parameters are
//! fixed; see [`EncoderConfig`].
//!
//! ```no_run
//! let ok = pcm_m4a::convert_pcm_to_m4a("/data/voice.pcm", "/data/voice.m4a");
//! assert!(ok);
//! ```

pub mod config;
pub mod error;
pub mod ffi;
pub mod ffmpeg;
pub mod logging;
pub mod pcm;
pub mod pipeline;
pub mod transcode;

#[cfg(test)]
pub(crate) mod tests;

use std::path::Path;

pub use config::{ConvertOptions, EncoderConfig};
pub use error::{ConvertError, FfmpegError, Result, Stage};
pub use pipeline::{ConversionRequest, ConversionSummary, Converter, MediaBackend, SampleSource};
pub use transcode::backend::FfmpegBackend;

/// Convert with FFmpeg, reporting which stage failed.
pub fn convert(request: &ConversionRequest, options: &ConvertOptions) -> Result<ConversionSummary> {
    let backend = FfmpegBackend::new(options).map_err(ConvertError::Init)?;
    Converter::new(backend, options.clone()).convert(request)
}

/// Convert `input` into `output`, returning only whether it worked.
///
/// Options come from the file named by `PCM_M4A_CONFIG`, if any.
pub fn convert_pcm_to_m4a(input: impl AsRef<Path>, output: impl AsRef<Path>) -> bool {
    let options = ConvertOptions::from_env();
    let request = ConversionRequest::new(input.as_ref(), output.as_ref());
    convert(&request, &options).is_ok()
}
