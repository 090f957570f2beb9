use std::fs::{create_dir_all, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Where log lines go
#[derive(Debug, Clone)]
pub enum LogTarget {
    /// Append to a file; used while the TUI owns the terminal
    File(PathBuf),
    Stderr,
}

/// `RUST_LOG` wins; otherwise the configured level, falling back to info
pub fn env_filter(level: &str) -> EnvFilter {
    let fallback = match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Calling it twice keeps the first one.
pub fn init_logging(target: LogTarget, level: &str) -> Result<()> {
    match target {
        LogTarget::File(path) => {
            let file = open_log_file(&path)?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter(level))
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            tracing::info!(log_file = %path.display(), "logging initialized");
        }
        LogTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter(level))
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_and_parents_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("metachat.log");

        open_log_file(&path).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        // only meaningful without RUST_LOG in the environment
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(env_filter("verbose").to_string(), "info");
            assert_eq!(env_filter("DEBUG").to_string(), "debug");
        }
    }
}
