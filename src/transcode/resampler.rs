//! Sample format converter for the encoding pipeline
//!
//! Converts raw S16 mono PCM chunks into frames in the encoder's working
//! format. The rate is left untouched: input and output rate are both the
//! encoder's negotiated rate.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

use crate::config::EncoderConfig;
use crate::error::FfmpegError;
use crate::transcode::encoder::AacEncoder;

/// Audio resampler wrapping FFmpeg's `SwrContext`. Dropping it frees the context.
pub struct AudioResampler {
    context: resampling::Context,
    input_format: Sample,
    input_layout: ChannelLayout,
    output_format: Sample,
    output_layout: ChannelLayout,
    rate: u32,
}

impl AudioResampler {
    /// Create a resampler from the configured PCM input to whatever the
    /// opened `encoder` negotiated.
    pub fn new(encoder: &AacEncoder, config: &EncoderConfig) -> Result<Self, FfmpegError> {
        let rate = encoder.rate();
        let output_format = encoder.format();

        let context = resampling::Context::get(
            config.input_format,
            config.input_layout,
            rate,
            output_format,
            config.output_layout,
            rate,
        )
        .map_err(|e| {
            FfmpegError::ResamplerCreate(format!(
                "{:?} {:?} -> {:?} {:?} at {} Hz: {}",
                config.input_format,
                config.input_layout,
                output_format,
                config.output_layout,
                rate,
                e
            ))
        })?;

        Ok(Self {
            context,
            input_format: config.input_format,
            input_layout: config.input_layout,
            output_format,
            output_layout: config.output_layout,
            rate,
        })
    }

    /// Convert one chunk of PCM samples into a frame of the encoder's
    /// format, sized to exactly `samples.len()`.
    pub fn convert(&mut self, samples: &[i16]) -> Result<ffmpeg::util::frame::Audio, FfmpegError> {
        let mut input = ffmpeg::util::frame::Audio::new(self.input_format, samples.len(), self.input_layout);
        input.set_rate(self.rate);
        {
            let plane = input.data_mut(0);
            let needed = samples.len() * std::mem::size_of::<i16>();
            if plane.len() < needed {
                return Err(FfmpegError::Resample(format!(
                    "input plane holds {} bytes, need {}",
                    plane.len(),
                    needed
                )));
            }
            for (dst, sample) in plane[..needed].chunks_exact_mut(2).zip(samples) {
                dst.copy_from_slice(&sample.to_ne_bytes());
            }
        }

        let mut output =
            ffmpeg::util::frame::Audio::new(self.output_format, samples.len(), self.output_layout);
        output.set_rate(self.rate);

        self.context
            .run(&input, &mut output)
            .map_err(|e| FfmpegError::Resample(format!("Resampling error: {}", e)))?;

        if output.samples() != samples.len() {
            return Err(FfmpegError::Resample(format!(
                "converted {} of {} samples",
                output.samples(),
                samples.len()
            )));
        }

        Ok(output)
    }

    /// The output sample format.
    pub fn output_format(&self) -> Sample {
        self.output_format
    }

    /// The sample rate on both sides of the conversion.
    pub fn rate(&self) -> u32 {
        self.rate
    }
}
