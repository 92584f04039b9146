use crate::backup::artifact::Area;
use crate::backup::encrypt::Encryptor;
use crate::backup::host::HostConnection;
use crate::backup::remote::{ExecOptions, RemoteCommand};
use bon::Builder;
use getset::Getters;
use std::time::Duration;

/// Deadline of every remote call unless the plan says otherwise
pub static DEFAULT_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackupTarget {
    /// A trailing `/` makes it a directory
    Path { path: String },
    /// Output of a named remote command
    Command { name: String, command: RemoteCommand },
}

impl BackupTarget {
    pub fn path<S: Into<String>>(path: S) -> Self {
        BackupTarget::Path { path: path.into() }
    }

    pub fn command<S: Into<String>>(name: S, command: RemoteCommand) -> Self {
        BackupTarget::Command {
            name: name.into(),
            command,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BackupTarget::Path { path } => path,
            BackupTarget::Command { name, .. } => name,
        }
    }

    pub fn area(&self) -> Area {
        match self {
            BackupTarget::Path { .. } => Area::Path,
            BackupTarget::Command { .. } => Area::Stdout,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, BackupTarget::Path { path } if path.ends_with('/'))
    }
}

/// Everything needed to back up one host, defaults already merged in.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct JobSpec {
    /// Plan key, used in artifact names and report rows
    #[builder(into)]
    host: String,
    connection: HostConnection,
    #[builder(default)]
    pre: Vec<RemoteCommand>,
    #[builder(default)]
    targets: Vec<BackupTarget>,
    #[builder(default)]
    post: Vec<RemoteCommand>,
    #[builder(default)]
    encryptor: Encryptor,
    #[builder(default)]
    recipients: Vec<String>,
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
}

impl JobSpec {
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions::builder().timeout(self.timeout).build()
    }
}
