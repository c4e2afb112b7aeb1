//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// Logs go to stderr, and additionally to a daily-rolled file under `log_dir`
/// when one is configured. `RUST_LOG` overrides the default level. The
/// returned guard must be kept alive for the file writer to flush.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = || {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
  };

  let stderr_layer = fmt::layer()
    .with_writer(std::io::stderr)
    .with_filter(filter());

  let (file_layer, guard) = match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(dir, "lemmy-sync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter());
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
