use crate::backup::notifications::Notification;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use getset::Getters;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes the report to a local HTML file, replacing it atomically.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct FileNotification {
    path: PathBuf,
}

impl FileNotification {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileNotification { path: path.into() }
    }
}

impl Notification for FileNotification {
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)
            .map_err(Error::from)
            .with_msg(format!("Cannot create report next to {:?}", self.path))?;
        write!(file, "<h1>{}</h1>{}", topic, msg)?;
        file.persist(&self.path)
            .map_err(|e| Error::from(e.error))
            .with_msg(format!("Cannot write report {:?}", self.path))?;
        tracing::info!("Backup statistics created at {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_report_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.html");
        std::fs::write(&path, "stale").unwrap();

        FileNotification::new(&path)
            .send("Backup results for 2024-01-01: Ok", "<table></table>")
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "<h1>Backup results for 2024-01-01: Ok</h1><table></table>"
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_file_report_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = FileNotification::new(dir.path().join("missing/report.html")).send("t", "m");
        assert!(result.is_err());
    }
}
