use color_eyre::Result;
use entry_sync::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// RUST_LOG wins over the configured level. When a log directory is set,
/// records are also written to a daily file there; keep the returned guard
/// alive until exit so buffered lines are flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(&config.level)?,
  };
  let stderr = fmt::layer().with_writer(std::io::stderr);

  match &config.dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "entry-sync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()?;

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .try_init()?;

      Ok(None)
    }
  }
}
