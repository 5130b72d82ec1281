//! Owned output container and output sink
//!
//! `avformat_alloc_output_context2` and `avio_open` are kept as two separate
//! handles so that a failure between them releases only what was acquired.

use std::path::{Path, PathBuf};
use std::ptr;

use ffmpeg_next as ffmpeg;

use super::path_to_cstring;
use crate::error::FfmpegError;

/// Output format context allocated for a file path.
///
/// Dropping it frees the context and every stream it owns.
pub struct OutputContainer {
    inner: ffmpeg::format::context::Output,
    path: PathBuf,
}

impl OutputContainer {
    /// Allocate a container whose format is inferred from `path`.
    ///
    /// No file is opened; see [`OutputSink::open`].
    pub fn alloc(path: &Path) -> Result<Self, FfmpegError> {
        let filename = path_to_cstring(path)?;
        let mut ctx: *mut ffmpeg::ffi::AVFormatContext = ptr::null_mut();

        // SAFETY: `ctx` is a valid out-pointer; on success FFmpeg stores a
        // freshly allocated context in it, which `Output::wrap` then owns.
        let ret = unsafe {
            ffmpeg::ffi::avformat_alloc_output_context2(
                &mut ctx,
                ptr::null_mut(),
                ptr::null(),
                filename.as_ptr(),
            )
        };
        if ret < 0 || ctx.is_null() {
            return Err(FfmpegError::MuxerCreate(format!(
                "no output format for {:?}: {}",
                path,
                ffmpeg::Error::from(ret)
            )));
        }

        let inner = unsafe { ffmpeg::format::context::Output::wrap(ctx) };
        tracing::debug!(
            "Allocated output container {:?} ({})",
            path,
            inner.format().name()
        );

        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// The format writes somewhere other than a file (`AVFMT_NOFILE`).
    pub fn is_self_managed(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::NO_FILE)
    }

    /// The format wants codec extradata in a global header.
    pub fn needs_global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time base the muxer chose for a stream (valid after the header).
    pub fn stream_time_base(&self, index: usize) -> Option<ffmpeg::Rational> {
        self.inner.stream(index).map(|s| s.time_base())
    }

    pub fn write_header(&mut self) -> Result<(), FfmpegError> {
        self.inner
            .write_header()
            .map_err(|e| FfmpegError::WriteHeader(format!("{:?}: {}", self.path, e)))
    }

    /// Tag `packet` with its stream, rescale it from `time_base` to the
    /// stream's time base and write it through the interleaving queue.
    pub fn write_packet(
        &mut self,
        stream_index: usize,
        packet: &mut ffmpeg::Packet,
        time_base: ffmpeg::Rational,
    ) -> Result<(), FfmpegError> {
        let out_time_base = self.stream_time_base(stream_index).ok_or_else(|| {
            FfmpegError::WritePacket(format!("stream {} not found", stream_index))
        })?;

        packet.set_stream(stream_index);
        packet.set_position(-1);
        packet.rescale_ts(time_base, out_time_base);
        packet
            .write_interleaved(&mut self.inner)
            .map_err(|e| FfmpegError::WritePacket(format!("Failed to write packet: {}", e)))
    }

    pub fn write_trailer(&mut self) -> Result<(), FfmpegError> {
        self.inner
            .write_trailer()
            .map_err(|e| FfmpegError::WriteTrailer(format!("{:?}: {}", self.path, e)))
    }

    /// Get the inner context for direct access
    pub fn inner_mut(&mut self) -> &mut ffmpeg::format::context::Output {
        &mut self.inner
    }
}

/// The container's open output byte sink (`AVFormatContext::pb`).
///
/// Must be dropped before the container it was opened on; the pipeline's
/// resource set enforces that order.
pub struct OutputSink {
    ctx: *mut ffmpeg::ffi::AVFormatContext,
    path: PathBuf,
}

impl OutputSink {
    /// Open the output file for writing, or return `None` when the format
    /// manages its own output.
    pub fn open(container: &mut OutputContainer) -> Result<Option<Self>, FfmpegError> {
        if container.is_self_managed() {
            tracing::debug!("Output format is self-managed, no sink opened");
            return Ok(None);
        }

        let path = container.path.clone();
        let filename = path_to_cstring(&path)?;
        let ctx = unsafe { container.inner.as_mut_ptr() };

        // SAFETY: `ctx` is the live context owned by `container`; `pb` is
        // null until this call sets it.
        let ret = unsafe {
            ffmpeg::ffi::avio_open(
                &mut (*ctx).pb,
                filename.as_ptr(),
                ffmpeg::ffi::AVIO_FLAG_WRITE as std::ffi::c_int,
            )
        };
        if ret < 0 {
            return Err(FfmpegError::OpenOutput(format!(
                "{:?}: {}",
                path,
                ffmpeg::Error::from(ret)
            )));
        }

        tracing::debug!("Opened output sink {:?}", path);
        Ok(Some(Self { ctx, path }))
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        // SAFETY: the owning container is still alive (see type docs);
        // `avio_closep` nulls `pb` so the container's own drop skips it.
        unsafe {
            ffmpeg::ffi::avio_closep(&mut (*self.ctx).pb);
        }
        tracing::debug!("Closed output sink {:?}", self.path);
    }
}
