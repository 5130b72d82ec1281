//! PCM → AAC/M4A conversion pipeline
//!
//! Setup runs eight stages in order, each adding one resource to a
//! [`ResourceSet`]. The set releases whatever it holds, in a fixed order,
//! when it is dropped, so success, `?` early returns and panics all share
//! one teardown path. The only difference on success is that the trailer
//! was written before the set goes away.

use std::path::{Path, PathBuf};

use crate::config::{ConvertOptions, EncoderConfig};
use crate::error::{ConvertError, FfmpegError, Result, Stage};

/// Input and output of one conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl ConversionRequest {
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
        }
    }
}

/// What a successful conversion did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Frames submitted to the encoder
    pub frames: u64,
    /// PCM samples consumed
    pub samples: u64,
    /// Packets handed to the muxer, flush included
    pub packets: u64,
    pub sample_rate: u32,
}

impl ConversionSummary {
    /// Duration of the consumed input.
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.samples as f64 / self.sample_rate as f64)
    }
}

/// One chunk of input samples and the timestamp of its first sample,
/// in units of 1 / sample rate.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub samples: &'a [i16],
    pub pts: i64,
}

/// An open stream of PCM samples. Dropping it closes the input.
pub trait SampleSource {
    fn path(&self) -> &Path;

    /// Fill `buf` with up to `buf.len()` samples; `0` means end of input.
    fn read_chunk(&mut self, buf: &mut [i16]) -> std::io::Result<usize>;
}

/// The codec/container library the pipeline drives.
///
/// Every resource type is an owned handle whose `Drop` releases it.
pub trait MediaBackend {
    type Source: SampleSource;
    type Container;
    type Codec;
    type Encoder;
    type Sink;
    type Resampler;

    /// Allocate a container whose format is inferred from `output`.
    fn alloc_container(&self, output: &Path) -> std::result::Result<Self::Container, FfmpegError>;

    fn find_encoder(&self, config: &EncoderConfig) -> std::result::Result<Self::Codec, FfmpegError>;

    /// Add the output stream and open the encoder feeding it.
    fn open_encoder(
        &self,
        container: &mut Self::Container,
        codec: Self::Codec,
        config: &EncoderConfig,
    ) -> std::result::Result<Self::Encoder, FfmpegError>;

    fn publish_parameters(
        &self,
        container: &mut Self::Container,
        encoder: &Self::Encoder,
    ) -> std::result::Result<(), FfmpegError>;

    /// Open the output file, or `None` for formats that manage their own output.
    fn open_sink(
        &self,
        container: &mut Self::Container,
    ) -> std::result::Result<Option<Self::Sink>, FfmpegError>;

    fn write_header(&self, container: &mut Self::Container) -> std::result::Result<(), FfmpegError>;

    fn init_resampler(
        &self,
        encoder: &Self::Encoder,
        config: &EncoderConfig,
    ) -> std::result::Result<Self::Resampler, FfmpegError>;

    fn open_input(&self, path: &Path) -> std::io::Result<Self::Source>;

    /// Convert, encode and mux one chunk. Returns the number of packets written.
    fn encode_chunk(
        &self,
        chunk: Chunk<'_>,
        resampler: &mut Self::Resampler,
        encoder: &mut Self::Encoder,
        container: &mut Self::Container,
    ) -> std::result::Result<u64, FfmpegError>;

    /// Drain the encoder at end of input. Returns the number of packets written.
    fn flush(
        &self,
        encoder: &mut Self::Encoder,
        container: &mut Self::Container,
    ) -> std::result::Result<u64, FfmpegError>;

    fn write_trailer(&self, container: &mut Self::Container) -> std::result::Result<(), FfmpegError>;
}

/// Removes the output file on drop unless [`PartialOutput::keep`] was called.
pub struct PartialOutput {
    path: PathBuf,
    armed: bool,
}

impl PartialOutput {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed partial output {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove partial output {:?}: {}", self.path, e),
        }
    }
}

/// Resources held by a conversion in flight.
///
/// Exactly the resources acquired so far are `Some`.
pub struct ResourceSet<B: MediaBackend> {
    source: Option<B::Source>,
    resampler: Option<B::Resampler>,
    encoder: Option<B::Encoder>,
    sink: Option<B::Sink>,
    container: Option<B::Container>,
    partial_output: Option<PartialOutput>,
}

impl<B: MediaBackend> ResourceSet<B> {
    pub fn new() -> Self {
        Self {
            source: None,
            resampler: None,
            encoder: None,
            sink: None,
            container: None,
            partial_output: None,
        }
    }

    /// Release everything held, in order: input, resampler, encoder,
    /// sink, container, then the partial-output guard.
    ///
    /// Absent resources are skipped, so calling this again is a no-op.
    pub fn release(&mut self) {
        if let Some(source) = self.source.take() {
            tracing::debug!("Closing PCM input {:?}", source.path());
            drop(source);
        }
        if let Some(resampler) = self.resampler.take() {
            drop(resampler);
            tracing::debug!("Freed resampler");
        }
        if let Some(encoder) = self.encoder.take() {
            drop(encoder);
            tracing::debug!("Freed encoder");
        }
        if let Some(sink) = self.sink.take() {
            drop(sink);
        }
        if let Some(container) = self.container.take() {
            drop(container);
            tracing::debug!("Freed output container");
        }
        drop(self.partial_output.take());
    }
}

impl<B: MediaBackend> Default for ResourceSet<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: MediaBackend> Drop for ResourceSet<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Runs conversions against a [`MediaBackend`].
pub struct Converter<B: MediaBackend> {
    backend: B,
    config: EncoderConfig,
    options: ConvertOptions,
}

impl<B: MediaBackend> Converter<B> {
    pub fn new(backend: B, options: ConvertOptions) -> Self {
        Self {
            backend,
            config: EncoderConfig::default(),
            options,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Convert `request.input_path` into `request.output_path`.
    pub fn convert(&self, request: &ConversionRequest) -> Result<ConversionSummary> {
        self.config.validate()?;

        let mut resources = ResourceSet::<B>::new();
        let result = self.run(&mut resources, request);
        resources.release();

        match &result {
            Ok(summary) => tracing::info!(
                frames = summary.frames,
                packets = summary.packets,
                "Converted {:?} -> {:?} ({:.3}s)",
                request.input_path,
                request.output_path,
                summary.duration().as_secs_f64()
            ),
            Err(e) => tracing::error!(
                stage = ?e.stage(),
                "Conversion {:?} -> {:?} failed: {}",
                request.input_path,
                request.output_path,
                e
            ),
        }
        result
    }

    fn run(
        &self,
        set: &mut ResourceSet<B>,
        request: &ConversionRequest,
    ) -> Result<ConversionSummary> {
        let backend = &self.backend;
        let config = &self.config;

        // ── 1. Output container ───────────────────────────────────────────
        let container = set.container.insert(
            backend
                .alloc_container(&request.output_path)
                .map_err(|e| e.at(Stage::AllocContainer))?,
        );

        // ── 2. Encoder lookup ─────────────────────────────────────────────
        let codec = backend
            .find_encoder(config)
            .map_err(|e| e.at(Stage::FindEncoder))?;

        // ── 3. Stream + encoder ───────────────────────────────────────────
        let encoder = set.encoder.insert(
            backend
                .open_encoder(container, codec, config)
                .map_err(|e| e.at(Stage::OpenEncoder))?,
        );

        // ── 4. Stream parameters ──────────────────────────────────────────
        backend
            .publish_parameters(container, encoder)
            .map_err(|e| e.at(Stage::PublishParameters))?;

        // ── 5. Output sink ────────────────────────────────────────────────
        set.sink = backend
            .open_sink(container)
            .map_err(|e| e.at(Stage::OpenSink))?;
        if set.sink.is_some() && self.options.remove_partial_output {
            set.partial_output = Some(PartialOutput::new(&request.output_path));
        }

        // ── 6. Header ─────────────────────────────────────────────────────
        backend
            .write_header(container)
            .map_err(|e| e.at(Stage::WriteHeader))?;

        // ── 7. Resampler ──────────────────────────────────────────────────
        let resampler = set.resampler.insert(
            backend
                .init_resampler(encoder, config)
                .map_err(|e| e.at(Stage::InitResampler))?,
        );

        // ── 8. PCM input ──────────────────────────────────────────────────
        let source = set.source.insert(backend.open_input(&request.input_path).map_err(
            |source| ConvertError::Io {
                stage: Stage::OpenInput,
                path: request.input_path.clone(),
                source,
            },
        )?);

        // ── Sample loop ───────────────────────────────────────────────────
        let mut summary = ConversionSummary {
            sample_rate: config.sample_rate,
            ..Default::default()
        };
        let mut buf = vec![0i16; config.chunk_capacity];
        let mut pts: i64 = 0;

        loop {
            let read = source
                .read_chunk(&mut buf)
                .map_err(|source| ConvertError::Io {
                    stage: Stage::SampleLoop,
                    path: request.input_path.clone(),
                    source,
                })?;
            if read == 0 {
                break;
            }

            let chunk = Chunk {
                samples: &buf[..read],
                pts,
            };
            pts += read as i64;

            summary.packets += backend
                .encode_chunk(chunk, resampler, encoder, container)
                .map_err(|e| e.at(Stage::SampleLoop))?;
            summary.frames += 1;
            summary.samples += read as u64;
        }

        summary.packets += backend
            .flush(encoder, container)
            .map_err(|e| e.at(Stage::FlushEncoder))?;

        // ── Trailer ───────────────────────────────────────────────────────
        backend
            .write_trailer(container)
            .map_err(|e| e.at(Stage::WriteTrailer))?;

        if let Some(guard) = set.partial_output.take() {
            guard.keep();
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock::{Event, RecordingBackend, Resource};

    #[test]
    fn test_release_is_idempotent() {
        let backend = RecordingBackend::new();
        let mut set = ResourceSet::<RecordingBackend>::new();
        set.container = Some(backend.alloc_container(Path::new("x.m4a")).unwrap());
        set.encoder = Some(backend.handle(Resource::Encoder));

        set.release();
        set.release();
        drop(set);

        assert_eq!(
            backend.released(),
            vec![Resource::Encoder, Resource::Container]
        );
    }

    #[test]
    fn test_release_order_with_everything_held() {
        let dir = tempfile::tempdir().unwrap();
        let input = crate::tests::fixtures::write_pcm(dir.path(), "in.pcm", 16);
        let backend = RecordingBackend::new();
        let mut set = ResourceSet::<RecordingBackend>::new();
        // Acquire in setup order; release order must differ from reverse
        // acquisition (encoder goes before sink).
        set.container = Some(backend.alloc_container(Path::new("x.m4a")).unwrap());
        set.encoder = Some(backend.handle(Resource::Encoder));
        set.sink = Some(backend.handle(Resource::Sink));
        set.resampler = Some(backend.handle(Resource::Resampler));
        set.source = Some(backend.open_input(&input).unwrap());
        drop(set);

        assert_eq!(
            backend.released(),
            vec![
                Resource::Input,
                Resource::Resampler,
                Resource::Encoder,
                Resource::Sink,
                Resource::Container
            ]
        );
    }

    #[test]
    fn test_empty_set_releases_nothing() {
        let backend = RecordingBackend::new();
        drop(ResourceSet::<RecordingBackend>::new());
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_partial_output_guard() {
        let dir = tempfile::tempdir().unwrap();
        let removed = dir.path().join("removed.m4a");
        let kept = dir.path().join("kept.m4a");
        std::fs::write(&removed, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(PartialOutput::new(&removed));
        PartialOutput::new(&kept).keep();
        // Already gone is fine.
        drop(PartialOutput::new(&dir.path().join("never-created.m4a")));

        assert!(!removed.exists());
        assert!(kept.exists());
    }

    #[test]
    fn test_summary_duration() {
        let summary = ConversionSummary {
            frames: 87,
            samples: 88200,
            packets: 88,
            sample_rate: 44100,
        };
        assert_eq!(summary.duration(), std::time::Duration::from_secs(2));
        assert_eq!(
            ConversionSummary::default().duration(),
            std::time::Duration::ZERO
        );
    }

    #[test]
    fn test_converter_uses_fixed_config() {
        let converter = Converter::new(RecordingBackend::new(), ConvertOptions::default());
        assert_eq!(converter.config(), &EncoderConfig::default());
        assert!(converter.backend().events().is_empty());
    }

    #[test]
    fn test_alloc_failure_skips_header() {
        let backend = RecordingBackend::new().failing_at(Stage::AllocContainer);
        let converter = Converter::new(backend, ConvertOptions::default());
        let err = converter
            .convert(&ConversionRequest::new("in.pcm", "out.m4a"))
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::AllocContainer));
        assert!(!converter.backend().events().contains(&Event::Header));
    }
}
