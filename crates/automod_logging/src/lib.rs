//! Shared logging setup for AutoModerator binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "automod=info,automod_core=info,automod_worker=info";
/// Rotated files kept next to the live one.
const LOG_BACKUPS: usize = 4;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by AutoModerator binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Raise the console filter to debug for the automod crates.
    pub verbose: bool,
    /// Directory for the rolling log file. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl<'a> LogConfig<'a> {
    /// Console plus a rolling file under `~/.automod/logs`.
    pub fn with_default_dir(app_name: &'a str, verbose: bool) -> Self {
        Self {
            app_name,
            verbose,
            log_dir: Some(automod_protocol::paths::default_logs_dir()),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let base_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    let console_filter = if config.verbose {
        EnvFilter::new("automod=debug,automod_core=debug,automod_worker=debug")
    } else {
        base_filter()
    };

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file = match config.log_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
            let writer = SharedRollingWriter::new(dir, config.app_name)
                .context("Failed to initialize rolling log writer")?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(base_filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("Global tracing subscriber already installed")?;

    Ok(())
}

/// Size-capped `automod.log`, shifted to `automod.log.1`, `.2`, ... when full.
struct RollingFileAppender {
    dir: PathBuf,
    app_name: String,
    backups: usize,
    max_size: u64,
    file: Option<File>,
    current_size: u64,
}

impl RollingFileAppender {
    fn open(dir: PathBuf, app_name: &str, backups: usize, max_size: u64) -> io::Result<Self> {
        let mut appender = Self {
            dir,
            app_name: app_name.to_string(),
            backups: backups.max(1),
            max_size,
            file: None,
            current_size: 0,
        };
        appender.reopen()?;
        Ok(appender)
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(0))?;
        self.current_size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Generation 0 is the live file.
    fn path(&self, generation: usize) -> PathBuf {
        match generation {
            0 => self.dir.join(format!("{}.log", self.app_name)),
            n => self.dir.join(format!("{}.log.{}", self.app_name, n)),
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        for generation in (0..self.backups).rev() {
            let src = self.path(generation);
            if src.exists() {
                // rename replaces the oldest backup
                fs::rename(&src, self.path(generation + 1))?;
            }
        }
        self.reopen()
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size > 0 && self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file unavailable"))?;
        let written = file.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.as_mut().map_or(Ok(()), File::flush)
    }
}

/// Hands every fmt layer event to the one appender.
#[derive(Clone)]
struct SharedRollingWriter(Arc<Mutex<RollingFileAppender>>);

impl SharedRollingWriter {
    fn new(dir: PathBuf, app_name: &str) -> Result<Self> {
        let appender = RollingFileAppender::open(dir, app_name, LOG_BACKUPS, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", app_name))?;
        Ok(Self(Arc::new(Mutex::new(appender))))
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_keeps_bounded_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender =
            RollingFileAppender::open(dir.path().to_path_buf(), "automod", 2, 16).unwrap();

        for line in 0..6 {
            appender
                .write_all(format!("line {:06}\n", line).as_bytes())
                .unwrap();
        }
        appender.flush().unwrap();

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("automod.log"), "line 000005\n");
        assert_eq!(read("automod.log.1"), "line 000004\n");
        assert_eq!(read("automod.log.2"), "line 000003\n");
        assert!(!dir.path().join("automod.log.3").exists());
    }

    #[test]
    fn test_reopen_appends_to_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("automod.log"), "earlier\n").unwrap();

        let writer = SharedRollingWriter::new(dir.path().to_path_buf(), "automod").unwrap();
        let mut handle = writer.clone();
        handle.write_all(b"later\n").unwrap();
        handle.flush().unwrap();

        let contents = fs::read_to_string(dir.path().join("automod.log")).unwrap();
        assert_eq!(contents, "earlier\nlater\n");
    }
}
