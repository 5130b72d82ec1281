//! C ABI entry point for the mobile host
//!
//! The host passes two NUL-terminated UTF-8 paths and gets a single
//! success flag back. Details of a failure are only visible in the log.

use std::ffi::{c_char, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use crate::config::ConvertOptions;
use crate::pipeline::ConversionRequest;

static LOGGING: Once = Once::new();

/// Convert the PCM file at `input_path` into an M4A file at `output_path`.
///
/// Returns `false` on any failure, including null or non-UTF-8 arguments.
///
/// # Safety
///
/// Both pointers must be null or point to NUL-terminated strings that stay
/// valid for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn convert_pcm_to_m4a(
    input_path: *const c_char,
    output_path: *const c_char,
) -> bool {
    let loaded = ConvertOptions::try_from_env();
    let options = loaded.as_ref().cloned().unwrap_or_default();
    LOGGING.call_once(|| crate::logging::init_logging(&options));
    if let Err(e) = &loaded {
        tracing::warn!("{}. Using defaults.", e);
    }

    let (Some(input), Some(output)) = (path_arg(input_path), path_arg(output_path)) else {
        tracing::error!("convert_pcm_to_m4a: null or non-UTF-8 path argument");
        return false;
    };

    let request = ConversionRequest::new(input, output);
    match panic::catch_unwind(AssertUnwindSafe(|| crate::convert(&request, &options))) {
        Ok(result) => result.is_ok(),
        Err(_) => {
            tracing::error!("convert_pcm_to_m4a: conversion panicked");
            false
        }
    }
}

unsafe fn path_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}
