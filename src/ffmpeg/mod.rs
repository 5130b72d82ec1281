//! FFmpeg module - provides wrappers and utilities for FFmpeg library access
//!
//! This module handles:
//! - FFmpeg initialization
//! - Routing FFmpeg's log output into `tracing`
//! - Owned output container / output sink handles

pub mod container;

use std::ffi::CString;
use std::path::Path;
use std::sync::Once;

pub use ffmpeg_next as ffmpeg;

use crate::error::FfmpegError;

static LOG_FILTER: Once = Once::new();

/// Initialize the FFmpeg library.
///
/// Safe to call from every conversion. The level is applied on every call;
/// the log callback is installed only on the first.
pub fn init(level: ffmpeg::util::log::Level) -> Result<(), FfmpegError> {
    ffmpeg::init().map_err(|e| FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e)))?;

    ffmpeg::util::log::set_level(level);
    LOG_FILTER.call_once(|| {
        install_log_filter();
        tracing::debug!("FFmpeg initialized");
    });

    Ok(())
}

/// Install a custom FFmpeg log callback that forwards into `tracing` and
/// drops known-noisy messages.
///
/// Must only run once, before conversions start on other threads; `init`
/// guarantees that.
fn install_log_filter() {
    // SAFETY: modifies global FFmpeg state; called exactly once behind
    // `LOG_FILTER`.
    unsafe {
        ffmpeg::ffi::av_log_set_callback(Some(ffmpeg_log_callback));
    }
}

/// Messages that are expected with raw PCM input and mono AAC output.
const SUPPRESSED_MESSAGES: &[&str] = &[
    "Queue input is backward in time",
    "Encoder did not produce proper pts, making some up",
];

unsafe extern "C" fn ffmpeg_log_callback(
    avcl: *mut std::ffi::c_void,
    level: std::ffi::c_int,
    fmt: *const std::ffi::c_char,
    vl: ffmpeg::ffi::va_list,
) {
    use std::ffi::{c_char, c_int, CStr};

    // Respect the configured log level
    if level > ffmpeg::ffi::av_log_get_level() {
        return;
    }

    let mut buf = [0 as c_char; 1024];
    let mut print_prefix: c_int = 1;
    ffmpeg::ffi::av_log_format_line(
        avcl,
        level,
        fmt,
        vl,
        buf.as_mut_ptr(),
        buf.len() as c_int,
        &mut print_prefix,
    );

    let msg = CStr::from_ptr(buf.as_ptr()).to_string_lossy();
    let msg = msg.trim_end();
    if msg.is_empty() || SUPPRESSED_MESSAGES.iter().any(|s| msg.contains(s)) {
        return;
    }

    if level <= ffmpeg::ffi::AV_LOG_ERROR as c_int {
        tracing::error!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg::ffi::AV_LOG_WARNING as c_int {
        tracing::warn!(target: "ffmpeg", "{}", msg);
    } else if level <= ffmpeg::ffi::AV_LOG_INFO as c_int {
        tracing::info!(target: "ffmpeg", "{}", msg);
    } else {
        tracing::debug!(target: "ffmpeg", "{}", msg);
    }
}

/// Convert a filesystem path into the C string FFmpeg expects.
pub fn path_to_cstring(path: &Path) -> Result<CString, FfmpegError> {
    let s = path
        .to_str()
        .ok_or_else(|| FfmpegError::InvalidPath(format!("{:?} is not valid UTF-8", path)))?;
    CString::new(s).map_err(|_| FfmpegError::InvalidPath(format!("{:?} contains a NUL byte", path)))
}

/// Check whether the FFmpeg build includes an encoder for `id`.
pub fn is_encoder_available(id: ffmpeg::codec::Id) -> bool {
    ffmpeg::codec::encoder::find(id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_path_to_cstring() {
        let c = path_to_cstring(Path::new("/tmp/out.m4a")).unwrap();
        assert_eq!(c.to_str().unwrap(), "/tmp/out.m4a");
    }

    #[test]
    fn test_path_with_nul_is_rejected() {
        let path = PathBuf::from("/tmp/a\0b.m4a");
        assert!(matches!(
            path_to_cstring(&path),
            Err(FfmpegError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_init_is_repeatable() {
        init(ffmpeg::util::log::Level::Error).unwrap();
        init(ffmpeg::util::log::Level::Error).unwrap();
    }

    #[test]
    fn test_later_init_applies_its_level() {
        init(ffmpeg::util::log::Level::Error).unwrap();
        init(ffmpeg::util::log::Level::Verbose).unwrap();
        assert_eq!(
            ffmpeg::util::log::get_level(),
            Ok(ffmpeg::util::log::Level::Verbose)
        );
        init(ffmpeg::util::log::Level::Error).unwrap();
    }
}
