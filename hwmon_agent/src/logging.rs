//! Logging setup: console layer filtered by `RUST_LOG` (default `info`) and an
//! append-only debug log file. The file is owned by the returned `LogHandle`.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub struct LogHandle {
    file: Arc<File>,
    path: PathBuf,
}

impl LogHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Push buffered log lines to disk.
    pub fn flush(&self) {
        if let Err(e) = self.file.sync_data() {
            eprintln!("hwmon_agent: failed to flush {}: {e}", self.path.display());
        }
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(path: &Path) -> Result<LogHandle> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let file = Arc::new(file);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);
    let log_file = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::clone(&file))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(console)
        .with(log_file)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(LogHandle {
        file,
        path: path.to_path_buf(),
    })
}
