//! AAC encoder bound to an output stream
//!
//! Wraps an FFmpeg `AVCodecContext` that encodes FLTP mono frames into
//! AAC-LC packets for the stream it created on the output container.

use std::ops::Deref;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;

use crate::config::EncoderConfig;
use crate::error::FfmpegError;
use crate::ffmpeg::container::OutputContainer;

/// Look up the encoder implementation for `config.codec` in the registry.
pub fn find_encoder(config: &EncoderConfig) -> Result<ffmpeg::Codec, FfmpegError> {
    codec::encoder::find(config.codec).ok_or_else(|| {
        FfmpegError::EncoderNotFound(format!("{:?} not in this FFmpeg build", config.codec))
    })
}

/// Opened AAC encoder. Dropping it frees the codec context.
pub struct AacEncoder {
    encoder: ffmpeg::encoder::Audio,
    stream_index: usize,
    time_base: ffmpeg::Rational,
}

impl AacEncoder {
    /// Add an output stream for `codec` to `container` and open an encoder
    /// context configured from `config`.
    pub fn open(
        container: &mut OutputContainer,
        codec: ffmpeg::Codec,
        config: &EncoderConfig,
    ) -> Result<Self, FfmpegError> {
        let global_header = container.needs_global_header();
        let time_base = ffmpeg::Rational::new(1, config.sample_rate as i32);

        let stream_index = {
            let mut stream = container.inner_mut().add_stream(codec).map_err(|e| {
                FfmpegError::StreamConfig(format!("Failed to add audio stream: {}", e))
            })?;
            stream.set_time_base(time_base);
            stream.index()
        };

        // Build context and configure the audio encoder BEFORE opening
        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(time_base);

        let mut audio_enc = context.encoder().audio().map_err(|e| {
            FfmpegError::EncoderCreate(format!("Cannot get audio encoder handle: {}", e))
        })?;

        audio_enc.set_rate(config.sample_rate as i32);
        audio_enc.set_format(config.encoder_format);
        audio_enc.set_channel_layout(config.output_layout);
        audio_enc.set_bit_rate(config.bit_rate);
        if global_header {
            audio_enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let encoder = audio_enc.open_as(codec).map_err(|e| {
            FfmpegError::EncoderConfigure(format!(
                "{} rejected {:?} {} Hz {:?}: {}",
                codec.name(),
                config.encoder_format,
                config.sample_rate,
                config.output_layout,
                e
            ))
        })?;

        let frame_size = encoder.frame_size() as usize;
        if frame_size != 0 && frame_size != config.chunk_capacity {
            return Err(FfmpegError::EncoderConfigure(format!(
                "{} wants {} samples per frame, input chunks hold {}",
                codec.name(),
                frame_size,
                config.chunk_capacity
            )));
        }

        // The encoder may adjust the time base while opening.
        let ctx: &codec::Context = encoder.deref();
        let time_base: ffmpeg::Rational = unsafe { (*ctx.as_ptr()).time_base.into() };

        tracing::debug!(
            stream_index,
            rate = encoder.rate(),
            format = ?encoder.format(),
            frame_size = encoder.frame_size(),
            "Opened {} encoder",
            codec.name()
        );

        Ok(Self {
            encoder,
            stream_index,
            time_base,
        })
    }

    /// Copy the opened encoder's parameters into its stream's
    /// `AVCodecParameters`; the muxer needs them to write the header.
    pub fn publish_parameters(&self, container: &mut OutputContainer) -> Result<(), FfmpegError> {
        let mut stream = container
            .inner_mut()
            .stream_mut(self.stream_index)
            .ok_or_else(|| {
                FfmpegError::StreamConfig(format!("stream {} vanished", self.stream_index))
            })?;

        let ctx: &codec::Context = self.encoder.deref();
        // SAFETY: both pointers are live for the duration of the call; the
        // stream's `codecpar` is allocated by `avformat_new_stream`.
        let ret = unsafe {
            ffmpeg::ffi::avcodec_parameters_from_context(
                (*stream.as_mut_ptr()).codecpar,
                ctx.as_ptr(),
            )
        };
        if ret < 0 {
            return Err(FfmpegError::StreamConfig(format!(
                "Failed to copy encoder parameters: {}",
                ffmpeg::Error::from(ret)
            )));
        }
        Ok(())
    }

    /// Send one PCM frame to the encoder.
    pub fn send_frame(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<(), FfmpegError> {
        self.encoder
            .send_frame(frame)
            .map_err(|e| FfmpegError::EncodeFrame(format!("AAC encoder send_frame error: {}", e)))
    }

    /// Send EOF to flush the encoder's buffered output.
    pub fn send_eof(&mut self) -> Result<(), FfmpegError> {
        self.encoder
            .send_eof()
            .map_err(|e| FfmpegError::EncodeFrame(format!("AAC encoder send_eof error: {}", e)))
    }

    /// Receive one encoded AAC packet, or `None` if the encoder needs more input.
    pub fn receive_packet(&mut self) -> Result<Option<ffmpeg::codec::packet::Packet>, FfmpegError> {
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::EncodeFrame(format!(
                "AAC encoder receive_packet error: {}",
                e
            ))),
        }
    }

    /// Hand every packet the encoder has ready to the muxer. Returns how
    /// many were written; each packet is released right after its write.
    pub fn drain_into(&mut self, container: &mut OutputContainer) -> Result<u64, FfmpegError> {
        let mut written = 0;
        while let Some(mut packet) = self.receive_packet()? {
            container.write_packet(self.stream_index, &mut packet, self.time_base)?;
            written += 1;
        }
        Ok(written)
    }

    /// Index of the output stream this encoder feeds.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Time base of the packets the encoder emits.
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Negotiated sample format.
    pub fn format(&self) -> ffmpeg::format::Sample {
        self.encoder.format()
    }

    /// Negotiated sample rate.
    pub fn rate(&self) -> u32 {
        self.encoder.rate()
    }

    /// The number of samples per channel the encoder expects per frame.
    pub fn frame_size(&self) -> usize {
        self.encoder.frame_size() as usize
    }
}
