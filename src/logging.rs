//! Logging initialisation

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ConvertOptions;

/// Initialize logging with tracing.
///
/// `RUST_LOG` wins over the configured level. Does nothing if a global
/// subscriber is already installed (the host application may own one).
pub fn init_logging(options: &ConvertOptions) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(options));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if options.log_format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

/// Filter used when `RUST_LOG` is unset: the crate's own events plus
/// FFmpeg's, both at the configured level.
fn default_filter(options: &ConvertOptions) -> EnvFilter {
    EnvFilter::new(format!("pcm_m4a={0},ffmpeg={0}", options.log_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_enables_ffmpeg_events() {
        let subscriber =
            tracing_subscriber::registry().with(default_filter(&ConvertOptions::default()));
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "ffmpeg", tracing::Level::WARN));
            assert!(tracing::enabled!(target: "pcm_m4a::pipeline", tracing::Level::INFO));
            assert!(!tracing::enabled!(target: "ffmpeg", tracing::Level::DEBUG));
        });
    }

    #[test]
    fn test_init_logging_twice() {
        let options = ConvertOptions::default();
        init_logging(&options);
        init_logging(&ConvertOptions {
            log_format: "json".to_string(),
            ..options
        });
    }
}
