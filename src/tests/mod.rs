//! Crate-level tests
//!
//! - Recording backend for fault injection and release-order checks
//! - Pipeline behaviour under failure at every stage
//! - End-to-end conversions through the real FFmpeg AAC encoder

pub mod e2e;
