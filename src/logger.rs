use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Lines go to stderr and, when a path is
/// given, are appended to that file as well.
pub fn init(log_path: Option<&Path>) -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_path {
    Some(path) => {
      let file = OpenOptions::new().create(true).append(true).open(path)?;
      let writer = std::io::stderr.and(Mutex::new(file));
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;
    }
  }

  Ok(())
}
