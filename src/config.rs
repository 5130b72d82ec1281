//! Conversion configuration
//!
//! The encoder parameters are fixed; only the ambient behaviour (logging,
//! partial-output cleanup) can be tuned from a TOML file.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type};
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Environment variable naming an optional TOML options file.
pub const CONFIG_ENV: &str = "PCM_M4A_CONFIG";

/// Sample rate of both the PCM input and the AAC output
pub const SAMPLE_RATE: u32 = 44100;
/// Target AAC bitrate in bps
pub const BIT_RATE: usize = 128_000;
/// Number of PCM samples read and encoded per frame
pub const CHUNK_CAPACITY: usize = 1024;

/// Fixed encoder parameters.
///
/// The only constructor is [`Default`]; callers of the conversion API
/// cannot override any of these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConfig {
    pub codec: ffmpeg::codec::Id,
    /// Format of the raw PCM samples
    pub input_format: Sample,
    /// Working format handed to the encoder
    pub encoder_format: Sample,
    pub sample_rate: u32,
    pub bit_rate: usize,
    pub input_layout: ChannelLayout,
    pub output_layout: ChannelLayout,
    pub chunk_capacity: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: ffmpeg::codec::Id::AAC,
            input_format: Sample::I16(Type::Packed),
            encoder_format: Sample::F32(Type::Planar),
            sample_rate: SAMPLE_RATE,
            bit_rate: BIT_RATE,
            input_layout: ChannelLayout::MONO,
            output_layout: ChannelLayout::MONO,
            chunk_capacity: CHUNK_CAPACITY,
        }
    }
}

impl EncoderConfig {
    /// Check the internal consistency of the parameters.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ConvertError::Config("sample rate must be positive".into()));
        }
        if self.chunk_capacity == 0 {
            return Err(ConvertError::Config("chunk capacity must be positive".into()));
        }
        if self.input_layout != self.output_layout {
            return Err(ConvertError::Config(format!(
                "channel remixing is not supported: {:?} -> {:?}",
                self.input_layout, self.output_layout
            )));
        }
        Ok(())
    }

    /// Bytes of raw PCM consumed per full chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_capacity * std::mem::size_of::<i16>()
    }
}

/// Ambient options for a conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Remove the output file when the conversion fails after the sink
    /// was opened.
    pub remove_partial_output: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Output format (json, pretty)
    pub log_format: String,

    /// FFmpeg's own log level (quiet, error, warning, info, debug)
    pub ffmpeg_log_level: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            remove_partial_output: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            ffmpeg_log_level: "warning".to_string(),
        }
    }
}

impl ConvertOptions {
    /// Load options from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse options from a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConvertError::Config(e.to_string()))
    }

    /// Save options to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConvertError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content).map_err(|e| {
            ConvertError::Config(format!("failed to write {}: {}", path.as_ref().display(), e))
        })
    }

    /// Load from the file named by `PCM_M4A_CONFIG`, or use defaults.
    ///
    /// A file that cannot be loaded is reported and ignored.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| {
            tracing::warn!("{}. Using defaults.", e);
            Self::default()
        })
    }

    /// Like [`ConvertOptions::from_env`], but hand back the load error so
    /// the caller can report it once logging is up.
    pub fn try_from_env() -> Result<Self> {
        Self::from_optional_file(std::env::var_os(CONFIG_ENV).as_deref())
    }

    fn from_optional_file(path: Option<&std::ffi::OsStr>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// FFmpeg log level matching `ffmpeg_log_level`, `Warning` when unknown.
    pub fn ffmpeg_level(&self) -> ffmpeg::util::log::Level {
        use ffmpeg::util::log::Level;
        match self.ffmpeg_log_level.to_ascii_lowercase().as_str() {
            "quiet" => Level::Quiet,
            "panic" => Level::Panic,
            "fatal" => Level::Fatal,
            "error" => Level::Error,
            "info" => Level::Info,
            "verbose" => Level::Verbose,
            "debug" => Level::Debug,
            "trace" => Level::Trace,
            _ => Level::Warning,
        }
    }
}
