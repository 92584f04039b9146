//! How a target's bytes are produced on the remote side.

use crate::backup::file_ext::FileExtProvider;
use crate::backup::incremental::{ChangedFiles, IncrementalWindow};
use crate::backup::job::BackupTarget;
use crate::backup::remote::RemoteCommand;

static ARCHIVE_EXT: &str = "tgz";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureMethod {
    DirectoryArchive { path: String },
    /// Archive of the files changed inside the window, listed first
    IncrementalArchive { path: String },
    RawFile { path: String },
    Command { command: RemoteCommand },
}

impl CaptureMethod {
    pub fn for_target(target: &BackupTarget, window: &IncrementalWindow) -> Self {
        match target {
            BackupTarget::Path { path } if target.is_directory() => {
                if window.is_enabled() {
                    CaptureMethod::IncrementalArchive { path: path.clone() }
                } else {
                    CaptureMethod::DirectoryArchive { path: path.clone() }
                }
            }
            BackupTarget::Path { path } => CaptureMethod::RawFile { path: path.clone() },
            BackupTarget::Command { command, .. } => CaptureMethod::Command {
                command: command.clone(),
            },
        }
    }

    /// `None` for an incremental archive, whose command needs the listing.
    pub fn remote_command(&self) -> Option<RemoteCommand> {
        match self {
            CaptureMethod::DirectoryArchive { path } => {
                Some(RemoteCommand::argv(["tar", "-czf", "-", path.as_str()]))
            }
            CaptureMethod::IncrementalArchive { .. } => None,
            CaptureMethod::RawFile { path } => Some(RemoteCommand::argv(["cat", path.as_str()])),
            CaptureMethod::Command { command } => Some(command.clone()),
        }
    }
}

/// Non-recursive archive of exactly `files`, the NUL separated list on stdin.
pub fn incremental_archive_command(files: &ChangedFiles) -> RemoteCommand {
    RemoteCommand::argv(["tar", "-czf", "-", "--no-recursion", "--null", "-T", "-"])
        .with_stdin(files.to_null_separated())
}

impl FileExtProvider for CaptureMethod {
    fn file_ext(&self) -> Option<&'static str> {
        match self {
            CaptureMethod::DirectoryArchive { .. } | CaptureMethod::IncrementalArchive { .. } => {
                Some(ARCHIVE_EXT)
            }
            CaptureMethod::RawFile { .. } | CaptureMethod::Command { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::remote::CommandInput;

    #[test]
    fn test_trailing_separator_selects_archive() {
        let full = IncrementalWindow::Disabled;
        let dir = CaptureMethod::for_target(&BackupTarget::path("/var/lib/data/"), &full);
        assert_eq!(
            dir,
            CaptureMethod::DirectoryArchive {
                path: "/var/lib/data/".into()
            }
        );
        assert_eq!(
            dir.remote_command().unwrap().args(),
            &["tar", "-czf", "-", "/var/lib/data/"]
        );
        assert_eq!(dir.file_ext(), Some("tgz"));

        let file = CaptureMethod::for_target(&BackupTarget::path("/etc/hosts"), &full);
        assert_eq!(file.remote_command().unwrap().args(), &["cat", "/etc/hosts"]);
        assert_eq!(file.file_ext(), None);
    }

    #[test]
    fn test_window_only_changes_directories() {
        let window = IncrementalWindow::Since(1.0);
        let dir = CaptureMethod::for_target(&BackupTarget::path("/srv/"), &window);
        assert!(matches!(dir, CaptureMethod::IncrementalArchive { .. }));
        assert!(dir.remote_command().is_none());
        assert_eq!(dir.file_ext(), Some("tgz"));

        let file = CaptureMethod::for_target(&BackupTarget::path("/etc/hosts"), &window);
        assert!(matches!(file, CaptureMethod::RawFile { .. }));
    }

    #[test]
    fn test_command_target_runs_verbatim() {
        let command = RemoteCommand::argv(["pg_dumpall", "-U", "postgres"]);
        let method = CaptureMethod::for_target(
            &BackupTarget::command("pgdump", command.clone()),
            &IncrementalWindow::Disabled,
        );
        assert_eq!(method.remote_command(), Some(command));
        assert_eq!(method.file_ext(), None);
    }

    #[test]
    fn test_incremental_archive_command() {
        let files = ChangedFiles::from_null_separated(b"/srv/a\0/srv/b c\0");
        let command = incremental_archive_command(&files);
        assert_eq!(
            command.args(),
            &["tar", "-czf", "-", "--no-recursion", "--null", "-T", "-"]
        );
        match command.input() {
            CommandInput::Bytes(bytes) => assert_eq!(&bytes[..], b"/srv/a\0/srv/b c\0"),
            other => panic!("expected file list on stdin, got {other:?}"),
        }
    }
}
