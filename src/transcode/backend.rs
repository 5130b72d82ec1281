//! FFmpeg implementation of the pipeline's [`MediaBackend`]

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::config::{ConvertOptions, EncoderConfig};
use crate::error::FfmpegError;
use crate::ffmpeg::container::{OutputContainer, OutputSink};
use crate::pcm::PcmReader;
use crate::pipeline::{Chunk, MediaBackend};
use crate::transcode::encoder::{find_encoder, AacEncoder};
use crate::transcode::resampler::AudioResampler;

/// Drives libavformat / libavcodec / libswresample.
pub struct FfmpegBackend {
    log_level: ffmpeg::util::log::Level,
}

impl FfmpegBackend {
    /// Initialize FFmpeg at the configured log level and return a backend.
    pub fn new(options: &ConvertOptions) -> Result<Self, FfmpegError> {
        let log_level = options.ffmpeg_level();
        crate::ffmpeg::init(log_level)?;
        Ok(Self { log_level })
    }

    /// FFmpeg log level applied when this backend was created.
    pub fn log_level(&self) -> ffmpeg::util::log::Level {
        self.log_level
    }
}

impl MediaBackend for FfmpegBackend {
    type Source = PcmReader;
    type Container = OutputContainer;
    type Codec = ffmpeg::Codec;
    type Encoder = AacEncoder;
    type Sink = OutputSink;
    type Resampler = AudioResampler;

    fn alloc_container(&self, output: &Path) -> Result<OutputContainer, FfmpegError> {
        OutputContainer::alloc(output)
    }

    fn find_encoder(&self, config: &EncoderConfig) -> Result<ffmpeg::Codec, FfmpegError> {
        find_encoder(config)
    }

    fn open_encoder(
        &self,
        container: &mut OutputContainer,
        codec: ffmpeg::Codec,
        config: &EncoderConfig,
    ) -> Result<AacEncoder, FfmpegError> {
        AacEncoder::open(container, codec, config)
    }

    fn publish_parameters(
        &self,
        container: &mut OutputContainer,
        encoder: &AacEncoder,
    ) -> Result<(), FfmpegError> {
        encoder.publish_parameters(container)
    }

    fn open_sink(&self, container: &mut OutputContainer) -> Result<Option<OutputSink>, FfmpegError> {
        OutputSink::open(container)
    }

    fn write_header(&self, container: &mut OutputContainer) -> Result<(), FfmpegError> {
        container.write_header()
    }

    fn init_resampler(
        &self,
        encoder: &AacEncoder,
        config: &EncoderConfig,
    ) -> Result<AudioResampler, FfmpegError> {
        AudioResampler::new(encoder, config)
    }

    fn open_input(&self, path: &Path) -> std::io::Result<PcmReader> {
        PcmReader::open(path)
    }

    fn encode_chunk(
        &self,
        chunk: Chunk<'_>,
        resampler: &mut AudioResampler,
        encoder: &mut AacEncoder,
        container: &mut OutputContainer,
    ) -> Result<u64, FfmpegError> {
        let mut frame = resampler.convert(chunk.samples)?;
        frame.set_pts(Some(chunk.pts));
        encoder.send_frame(&frame)?;
        drop(frame);
        encoder.drain_into(container)
    }

    fn flush(
        &self,
        encoder: &mut AacEncoder,
        container: &mut OutputContainer,
    ) -> Result<u64, FfmpegError> {
        encoder.send_eof()?;
        encoder.drain_into(container)
    }

    fn write_trailer(&self, container: &mut OutputContainer) -> Result<(), FfmpegError> {
        container.write_trailer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_keeps_configured_log_level() {
        let options = ConvertOptions {
            ffmpeg_log_level: "error".to_string(),
            ..Default::default()
        };
        let backend = FfmpegBackend::new(&options).unwrap();
        assert_eq!(backend.log_level(), ffmpeg::util::log::Level::Error);
    }

    #[test]
    fn test_open_input_missing_file() {
        let backend = FfmpegBackend::new(&ConvertOptions::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = backend.open_input(&dir.path().join("missing.pcm")).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
