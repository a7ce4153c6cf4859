//! Logging and tracing initialization.

use crate::config::LoggingConfig;

/// Initialize the tracing subscriber from the `[logging]` config section.
///
/// `RUST_LOG` takes precedence over `level`. Events go to stderr because stdout carries
/// the batch preview, the confirmation prompt and the per-set summary. Module targets are
/// left out of plain output; job and set events already name their replay or set.
/// Calling this twice keeps the first subscriber.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}
