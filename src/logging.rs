use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: stderr, plus a daily-rotated file when configured.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process.
pub fn init(log_file: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(format!("drawchat_offline={}", default_level)));

  let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

  let (file_layer, guard) = match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

      let appender = tracing_appender::rolling::daily(dir, name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer().with_writer(writer).with_ansi(false);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
