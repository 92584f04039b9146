use crate::backup::host::HostConnection;
use crate::backup::remote::RemoteShell;
use bon::Builder;
use std::process::{Command, ExitStatus};

/// ssh reserves this status for its own failures (connection, authentication)
pub static SSH_TRANSPORT_EXIT_CODE: i32 = 255;

fn default_ssh_options() -> Vec<String> {
    ["-C", "-o", "BatchMode=yes"].map(String::from).to_vec()
}

#[derive(Clone, Debug, Builder)]
pub struct SshShell {
    #[builder(default = "ssh".to_string(), into)]
    program: String,
    #[builder(default = default_ssh_options())]
    options: Vec<String>,
}

impl Default for SshShell {
    fn default() -> Self {
        SshShell::builder().build()
    }
}

impl RemoteShell for SshShell {
    fn command(&self, connection: &HostConnection, argv: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.options);
        if let Some(user) = connection.user() {
            command.arg("-l").arg(user);
        }
        if let Some(port) = connection.port() {
            command.arg("-p").arg(port.to_string());
        }
        // ssh joins everything after the host with spaces for the remote login
        // shell, so each token is quoted exactly once here
        command
            .arg(connection.host())
            .arg("--")
            .args(argv.iter().map(|token| shell_escape(token)));
        command
    }

    fn is_transport_failure(&self, status: &ExitStatus) -> bool {
        status.code() == Some(SSH_TRANSPORT_EXIT_CODE)
    }
}

/// Quotes a token for a POSIX shell, leaving obviously safe tokens bare.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+')
    }) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}
