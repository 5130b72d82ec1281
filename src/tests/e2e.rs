//! End-to-end conversions through the real FFmpeg backend
//!
//! Skipped when the linked FFmpeg has no AAC encoder.

use std::path::Path;

use crate::ffmpeg::ffmpeg;

/// What a finished output file looks like to a demuxer.
#[derive(Debug)]
pub struct ProbedOutput {
    pub codec: ffmpeg::codec::Id,
    pub sample_rate: i32,
    pub channels: u16,
    pub duration_secs: f64,
}

/// Open `path` with libavformat and describe its audio stream.
pub fn probe(path: &Path) -> Result<ProbedOutput, ffmpeg::Error> {
    let context = ffmpeg::format::input(&path)?;
    let stream = context
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .ok_or(ffmpeg::Error::StreamNotFound)?;
    let params = stream.parameters();

    // SAFETY: `params` borrows from `context`, which outlives these reads.
    let (sample_rate, channels) = unsafe {
        let raw = params.as_ptr();
        ((*raw).sample_rate, (*raw).ch_layout.nb_channels as u16)
    };

    Ok(ProbedOutput {
        codec: params.id(),
        sample_rate,
        channels,
        duration_secs: context.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertOptions;
    use crate::error::Stage;
    use crate::ffmpeg::is_encoder_available;
    use crate::pipeline::ConversionRequest;
    use crate::tests::fixtures::write_pcm;

    fn aac_available() -> bool {
        crate::ffmpeg::init(ffmpeg::util::log::Level::Error).unwrap();
        is_encoder_available(ffmpeg::codec::Id::AAC)
    }

    #[test]
    fn test_two_second_tone() {
        if !aac_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = write_pcm(dir.path(), "tone.pcm", 88200);
        let output = dir.path().join("tone.m4a");

        let summary = crate::convert(
            &ConversionRequest::new(&input, &output),
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.frames, 87);
        assert_eq!(summary.samples, 88200);
        assert!(summary.packets >= 87);

        let probed = probe(&output).unwrap();
        assert_eq!(probed.codec, ffmpeg::codec::Id::AAC);
        assert_eq!(probed.sample_rate, 44100);
        assert_eq!(probed.channels, 1);
        let tolerance = 1024.0 / 44100.0 + 0.01;
        assert!(
            (probed.duration_secs - 2.0).abs() <= tolerance,
            "duration {}",
            probed.duration_secs
        );
    }

    #[test]
    fn test_empty_input_still_produces_a_file() {
        if !aac_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = write_pcm(dir.path(), "empty.pcm", 0);
        let output = dir.path().join("empty.m4a");

        let summary = crate::convert(
            &ConversionRequest::new(&input, &output),
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.frames, 0);
        assert!(output.exists());
    }

    #[test]
    fn test_missing_input_removes_output() {
        if !aac_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.m4a");

        assert!(!crate::convert_pcm_to_m4a(dir.path().join("missing.pcm"), &output));
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_input_leaves_unreadable_file_when_kept() {
        if !aac_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.m4a");
        let options = ConvertOptions {
            remove_partial_output: false,
            ..Default::default()
        };

        let err = crate::convert(
            &ConversionRequest::new(dir.path().join("missing.pcm"), &output),
            &options,
        )
        .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::OpenInput));

        // Header only, no trailer: present but not a usable MP4.
        assert!(output.exists());
        assert!(probe(&output).is_err());
    }

    #[test]
    fn test_missing_output_directory() {
        if !aac_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = write_pcm(dir.path(), "tone.pcm", 1000);
        let output = dir.path().join("missing").join("out.m4a");

        let err = crate::convert(
            &ConversionRequest::new(&input, &output),
            &ConvertOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::OpenSink));
    }

    #[test]
    fn test_unknown_output_extension() {
        if !aac_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = write_pcm(dir.path(), "tone.pcm", 1000);
        let output = dir.path().join("out.not-a-format");

        let err = crate::convert(
            &ConversionRequest::new(&input, &output),
            &ConvertOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::AllocContainer));
        assert!(!output.exists());
    }

    #[test]
    fn test_c_entry_point_converts() {
        if !aac_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = write_pcm(dir.path(), "tone.pcm", 4410);
        let output = dir.path().join("tone.m4a");

        let c_input = std::ffi::CString::new(input.to_str().unwrap()).unwrap();
        let c_output = std::ffi::CString::new(output.to_str().unwrap()).unwrap();
        let ok = unsafe { crate::ffi::convert_pcm_to_m4a(c_input.as_ptr(), c_output.as_ptr()) };

        assert!(ok);
        assert_eq!(probe(&output).unwrap().codec, ffmpeg::codec::Id::AAC);
    }
}
