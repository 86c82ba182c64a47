use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter, e.g. `TASKLET_LOG=tasklet=debug`
pub const LOG_ENV: &str = "TASKLET_LOG";

/// Install the global subscriber.
///
/// Logs always go to a daily rolling file under `log_dir`, since the TUI owns
/// the terminal. `stderr` additionally mirrors them to the console for the
/// headless commands. Keep the returned guard alive until exit or buffered
/// lines are lost.
pub fn init(log_dir: &Path, stderr: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "tasklet.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

  let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
  let stderr_layer = stderr.then(|| fmt::layer().with_writer(std::io::stderr));

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
