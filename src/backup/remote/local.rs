//! Test transport: runs the argv on this machine and remembers every command.

use crate::backup::host::HostConnection;
use crate::backup::remote::ssh::SSH_TRANSPORT_EXIT_CODE;
use crate::backup::remote::RemoteShell;
use std::collections::HashSet;
use std::process::{Command, ExitStatus};
use std::sync::{Mutex, PoisonError};

static MISSING_PROGRAM: &str = "/nonexistent/unreachable-remote-shell";

/// Runs the command like ssh does: a command killed by a signal makes the
/// shell itself exit with 255.
pub static SSH_LIKE: &str =
    r#""$@"; status=$?; if [ $status -gt 128 ]; then exit 255; fi; exit $status"#;

#[derive(Default)]
pub struct LocalShell {
    calls: Mutex<Vec<Vec<String>>>,
    unreachable: HashSet<String>,
    /// `sh -c` script run around every command, which is passed as `"$@"`
    wrapper: Option<String>,
}

impl LocalShell {
    /// Commands for `host` fail to spawn, like a host that cannot be reached.
    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    /// Every command runs inside `script`; exit 255 then counts as a
    /// transport failure.
    pub fn wrapped(mut self, script: &str) -> Self {
        self.wrapper = Some(script.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RemoteShell for LocalShell {
    fn command(&self, connection: &HostConnection, argv: &[String]) -> Command {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(argv.to_vec());
        if self.unreachable.contains(connection.host()) {
            return Command::new(MISSING_PROGRAM);
        }
        match &self.wrapper {
            Some(script) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(script).arg("sh").args(argv);
                command
            }
            None => {
                let mut command = Command::new(&argv[0]);
                command.args(&argv[1..]);
                command
            }
        }
    }

    fn is_transport_failure(&self, status: &ExitStatus) -> bool {
        self.wrapper.is_some() && status.code() == Some(SSH_TRANSPORT_EXIT_CODE)
    }
}
