//! Console logging plus an append-only log file kept across runs.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub static DEFAULT_LOG_FILE: &str = "backups.log";

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
/// A log file that cannot be opened only costs the file output.
pub fn init(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file, open_error) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file.map(file_layer))
        .init();

    if let (Some(path), Some(e)) = (log_file, open_error) {
        tracing::warn!("Cannot open log file {:?}, logging to the console only: {}", path, e);
    }
}

pub fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn file_layer<S>(file: File) -> fmt::Layer<S, DefaultFields, Format, Arc<File>> {
    fmt::layer().with_ansi(false).with_writer(Arc::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::Registry;

    #[test]
    fn test_file_layer_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_LOG_FILE);
        std::fs::write(&path, "previous run\n").unwrap();

        let subscriber = Registry::default().with(file_layer(open_log_file(&path).unwrap()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("[db1] Backup of db1 finished");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("previous run\n"));
        assert!(content.contains("INFO"));
        assert!(content.contains("[db1] Backup of db1 finished"));
        // no terminal colors in the file
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    fn test_open_log_file_in_missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(open_log_file(&dir.path().join("missing/backups.log")).is_err());
    }
}
