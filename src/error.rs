use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A step of the conversion pipeline, used to tag every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    AllocContainer,
    FindEncoder,
    OpenEncoder,
    PublishParameters,
    OpenSink,
    WriteHeader,
    InitResampler,
    OpenInput,
    SampleLoop,
    FlushEncoder,
    WriteTrailer,
}

impl Stage {
    /// The setup stages, in execution order.
    pub const SETUP: [Stage; 8] = [
        Stage::AllocContainer,
        Stage::FindEncoder,
        Stage::OpenEncoder,
        Stage::PublishParameters,
        Stage::OpenSink,
        Stage::WriteHeader,
        Stage::InitResampler,
        Stage::OpenInput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AllocContainer => "alloc output container",
            Stage::FindEncoder => "find AAC encoder",
            Stage::OpenEncoder => "open encoder",
            Stage::PublishParameters => "publish stream parameters",
            Stage::OpenSink => "open output sink",
            Stage::WriteHeader => "write header",
            Stage::InitResampler => "init resampler",
            Stage::OpenInput => "open PCM input",
            Stage::SampleLoop => "sample loop",
            Stage::FlushEncoder => "flush encoder",
            Stage::WriteTrailer => "write trailer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for a conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("{stage} failed: {source}")]
    Ffmpeg {
        stage: Stage,
        #[source]
        source: FfmpegError,
    },

    #[error("{stage} failed on {path:?}: {source}")]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("FFmpeg initialization failed: {0}")]
    Init(#[source] FfmpegError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConvertError {
    /// The pipeline stage that failed, if the error came from one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ConvertError::Ffmpeg { stage, .. } | ConvertError::Io { stage, .. } => Some(*stage),
            ConvertError::Init(_) | ConvertError::Config(_) => None,
        }
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Invalid path for FFmpeg: {0}")]
    InvalidPath(String),

    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    #[error("Failed to find encoder: codec_id={0}")]
    EncoderNotFound(String),

    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    #[error("Failed to configure encoder: {0}")]
    EncoderConfigure(String),

    #[error("Stream configuration failed: {0}")]
    StreamConfig(String),

    #[error("Failed to open output: {0}")]
    OpenOutput(String),

    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    #[error("Resampling error: {0}")]
    Resample(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),
}

impl FfmpegError {
    /// Attach the failing stage, producing a [`ConvertError`].
    pub fn at(self, stage: Stage) -> ConvertError {
        ConvertError::Ffmpeg {
            stage,
            source: self,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ConvertError>;
