//! Remote command execution.
//!
//! A [`RemoteCommand`] is an already tokenized argument vector, optionally
//! with bytes to feed on stdin. The [`RemoteExecutor`] hands it to a
//! [`RemoteShell`] (production: [`ssh::SshShell`]) which turns it into a local
//! process, then streams stdout to an [`OutputSink`] and stderr, line by line,
//! into the run's event log.

pub mod process;
pub mod ssh;

#[cfg(test)]
pub(crate) mod local;

use crate::backup::events::EventLog;
use crate::backup::host::HostConnection;
use crate::backup::incremental::IncrementalWindow;
use crate::backup::remote::process::{join_pipe_thread, ProcessInput, StreamProcess};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::validate::validate_argv;
use bon::Builder;
use itertools::Itertools;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use validator::{Validate, ValidationError, ValidationErrors};

/// Interpreter receiving plan scripts on stdin
pub static SCRIPT_INTERPRETER: &str = "/bin/sh";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CommandInput {
    #[default]
    None,
    Script(Arc<str>),
    Bytes(Arc<[u8]>),
}

/// Plan form of a command: a string is a script, a list is an argv.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandSpec {
    Script(String),
    Argv(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "CommandSpec")]
pub struct RemoteCommand {
    argv: Vec<String>,
    input: CommandInput,
}

impl From<CommandSpec> for RemoteCommand {
    fn from(spec: CommandSpec) -> Self {
        match spec {
            CommandSpec::Script(script) => RemoteCommand::script(script),
            CommandSpec::Argv(argv) => RemoteCommand::argv(argv),
        }
    }
}

impl RemoteCommand {
    pub fn argv<I: IntoIterator<Item = S>, S: Into<String>>(argv: I) -> Self {
        RemoteCommand {
            argv: argv.into_iter().map(Into::into).collect(),
            input: CommandInput::None,
        }
    }

    /// A script runs as [`SCRIPT_INTERPRETER`] with its text on stdin, so it is
    /// never split into words on this side.
    pub fn script<S: AsRef<str>>(script: S) -> Self {
        RemoteCommand {
            argv: vec![SCRIPT_INTERPRETER.to_string()],
            input: CommandInput::Script(script.as_ref().into()),
        }
    }

    pub fn with_stdin(mut self, bytes: Vec<u8>) -> Self {
        self.input = CommandInput::Bytes(bytes.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.argv
    }

    pub fn input(&self) -> &CommandInput {
        &self.input
    }

    pub fn is_script(&self) -> bool {
        matches!(self.input, CommandInput::Script(_))
    }

    pub fn stdin_bytes(&self) -> Option<Arc<[u8]>> {
        match &self.input {
            CommandInput::None => None,
            CommandInput::Script(script) => Some(Arc::from(script.as_bytes())),
            CommandInput::Bytes(bytes) => Some(bytes.clone()),
        }
    }

    /// Human readable form used in logs and report rows.
    pub fn label(&self) -> String {
        match &self.input {
            CommandInput::Script(script) => script.trim().to_string(),
            _ => self.argv.iter().join(" "),
        }
    }

    /// Scripts learn about an incremental run through an `INCREMENTAL=<days>` line.
    pub fn for_window(&self, window: &IncrementalWindow) -> RemoteCommand {
        match (&self.input, window.days()) {
            (CommandInput::Script(script), Some(days)) => RemoteCommand {
                argv: self.argv.clone(),
                input: CommandInput::Script(format!("INCREMENTAL={days}\n{script}").into()),
            },
            _ => self.clone(),
        }
    }
}

impl Validate for RemoteCommand {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_argv(&self.argv) {
            errors.add("argv", e);
        }
        if let CommandInput::Script(script) = &self.input {
            if script.trim().is_empty() {
                errors.add(
                    "script",
                    ValidationError::new("EmptyCommand").with_message("script is empty".into()),
                );
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Where the remote stdout goes.
#[derive(Debug)]
pub enum OutputSink {
    Discard,
    File(File),
    /// Left on the process handle for the next stage to take.
    Pipe,
}

#[derive(Clone, Copy, Debug, Default, Builder)]
pub struct ExecOptions {
    pub timeout: Option<Duration>,
}

/// Outcome of one remote command that could be started.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub simulated: bool,
    /// Last stderr lines, oldest first
    pub stderr_tail: Vec<String>,
}

impl ExecResult {
    pub fn simulated() -> Self {
        ExecResult {
            simulated: true,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.simulated || (!self.timed_out && self.exit_code == Some(0))
    }

    pub fn describe(&self) -> String {
        let status = if self.simulated {
            "simulated".to_string()
        } else if self.timed_out {
            "timed out".to_string()
        } else {
            match self.exit_code {
                Some(code) => format!("exit code {code}"),
                None => "killed by signal".to_string(),
            }
        };
        match self.stderr_tail.last() {
            Some(line) => format!("{status}: {line}"),
            None => status,
        }
    }
}

/// Turns an argv into a local process that runs it on the given host.
pub trait RemoteShell: Send + Sync {
    fn command(&self, connection: &HostConnection, argv: &[String]) -> Command;

    /// Exit statuses that mean the host was never reached.
    fn is_transport_failure(&self, _status: &ExitStatus) -> bool {
        false
    }
}

pub struct RemoteExecutor {
    shell: Arc<dyn RemoteShell>,
    events: Arc<EventLog>,
    simulate: bool,
}

impl RemoteExecutor {
    pub fn new(shell: Arc<dyn RemoteShell>, events: Arc<EventLog>, simulate: bool) -> Self {
        RemoteExecutor {
            shell,
            events,
            simulate,
        }
    }

    pub fn is_simulate(&self) -> bool {
        self.simulate
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Starts `command` on the host. `None` in simulate mode, nothing is spawned.
    pub fn spawn(
        &self,
        connection: &HostConnection,
        command: &RemoteCommand,
        sink: OutputSink,
        options: &ExecOptions,
    ) -> Result<Option<StreamProcess>> {
        let host = connection.host().as_str();
        if self.simulate {
            self.events
                .info(host, format!("Simulate {}:'{}'", host, truncated(&command.label())));
            return Ok(None);
        }
        self.events
            .info(host, format!("Run {}:'{}'", host, truncated(&command.label())));

        let argv = connection
            .become_argv()
            .iter()
            .chain(command.args())
            .cloned()
            .collect_vec();
        let stdout = match sink {
            OutputSink::Discard => Stdio::null(),
            OutputSink::File(file) => Stdio::from(file),
            OutputSink::Pipe => Stdio::piped(),
        };
        let input = match command.stdin_bytes() {
            Some(bytes) => ProcessInput::Bytes(bytes),
            None => ProcessInput::Null,
        };

        StreamProcess::start(
            host,
            self.shell.command(connection, &argv),
            input,
            stdout,
            self.events.clone(),
            options.timeout,
            Some(self.shell.clone()),
        )
        .map(Some)
        .map_err(|e| Error::transport(host, format!("cannot start remote shell: {e}")))
    }

    pub fn run(
        &self,
        connection: &HostConnection,
        command: &RemoteCommand,
        sink: OutputSink,
        options: &ExecOptions,
    ) -> Result<ExecResult> {
        self.run_captured(connection, command, sink, options)
            .map(|(result, _)| result)
    }

    /// Like [`RemoteExecutor::run`]; with [`OutputSink::Pipe`] the stdout bytes are returned.
    pub fn run_captured(
        &self,
        connection: &HostConnection,
        command: &RemoteCommand,
        sink: OutputSink,
        options: &ExecOptions,
    ) -> Result<(ExecResult, Vec<u8>)> {
        let Some(mut process) = self.spawn(connection, command, sink, options)? else {
            return Ok((ExecResult::simulated(), Vec::new()));
        };
        // drained on its own thread so the deadline keeps being checked
        let reader = process.take_stdout().map(|mut stdout| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).map(|_| buf)
            })
        });
        let result = process.wait()?;
        let output = match reader {
            Some(handle) => {
                join_pipe_thread(handle, result.timed_out).unwrap_or_else(|| Ok(Vec::new()))?
            }
            None => Vec::new(),
        };
        Ok((result, output))
    }
}

fn truncated(label: &str) -> String {
    const MAX: usize = 60;
    let first_line = label.lines().next().unwrap_or_default();
    if first_line.chars().count() > MAX || first_line.len() < label.len() {
        format!("{}...", first_line.chars().take(MAX).collect::<String>())
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::remote::local::LocalShell;

    fn executor(shell: Arc<LocalShell>, simulate: bool) -> RemoteExecutor {
        RemoteExecutor::new(shell, Arc::new(EventLog::default()), simulate)
    }

    fn connection() -> HostConnection {
        HostConnection::builder().host("local").build()
    }

    #[test]
    fn test_plan_command_forms() {
        let script: RemoteCommand = serde_yml::from_str("\"pg_dump -U postgres app\"").unwrap();
        assert!(script.is_script());
        assert_eq!(script.args(), &[SCRIPT_INTERPRETER.to_string()]);
        assert_eq!(script.label(), "pg_dump -U postgres app");

        let argv: RemoteCommand = serde_yml::from_str("[systemctl, stop, 'my app']").unwrap();
        assert!(!argv.is_script());
        assert_eq!(argv.args(), &["systemctl", "stop", "my app"]);
        assert!(argv.stdin_bytes().is_none());
    }

    #[test]
    fn test_command_validation() {
        assert!(RemoteCommand::argv(["ls"]).validate().is_ok());
        assert!(RemoteCommand::argv(Vec::<String>::new()).validate().is_err());
        assert!(RemoteCommand::script("  ").validate().is_err());
    }

    #[test]
    fn test_for_window_prefixes_scripts_only() {
        let window = IncrementalWindow::Since(0.5);
        let script = RemoteCommand::script("echo $INCREMENTAL").for_window(&window);
        assert_eq!(
            script.stdin_bytes().as_deref(),
            Some(&b"INCREMENTAL=0.5\necho $INCREMENTAL"[..])
        );

        let argv = RemoteCommand::argv(["true"]);
        assert_eq!(argv.for_window(&window), argv);

        let full = RemoteCommand::script("echo").for_window(&IncrementalWindow::Disabled);
        assert_eq!(full.stdin_bytes().as_deref(), Some(&b"echo"[..]));
    }

    #[test]
    fn test_run_success_and_failure() {
        let shell = Arc::new(LocalShell::default());
        let executor = executor(shell.clone(), false);
        let ok = executor
            .run(&connection(), &RemoteCommand::argv(["true"]), OutputSink::Discard, &ExecOptions::default())
            .unwrap();
        assert!(ok.success());

        let failed = executor
            .run(
                &connection(),
                &RemoteCommand::script("echo broken >&2; exit 3"),
                OutputSink::Discard,
                &ExecOptions::default(),
            )
            .unwrap();
        assert!(!failed.success());
        assert_eq!(failed.exit_code, Some(3));
        assert_eq!(failed.stderr_tail, vec!["broken".to_string()]);
        assert_eq!(failed.describe(), "exit code 3: broken");
        assert_eq!(shell.calls().len(), 2);
    }

    #[test]
    fn test_run_captured_returns_stdout() {
        let executor = executor(Arc::new(LocalShell::default()), false);
        let (result, output) = executor
            .run_captured(
                &connection(),
                &RemoteCommand::argv(["printf", "a\\0b"]),
                OutputSink::Pipe,
                &ExecOptions::default(),
            )
            .unwrap();
        assert!(result.success());
        assert_eq!(output, b"a\0b");
    }

    #[test]
    fn test_stdin_is_fed() {
        let executor = executor(Arc::new(LocalShell::default()), false);
        let (_, output) = executor
            .run_captured(
                &connection(),
                &RemoteCommand::argv(["cat"]).with_stdin(b"payload".to_vec()),
                OutputSink::Pipe,
                &ExecOptions::default(),
            )
            .unwrap();
        assert_eq!(output, b"payload");
    }

    #[test]
    fn test_become_is_prepended() {
        let shell = Arc::new(LocalShell::default());
        let executor = executor(shell.clone(), false);
        let connection = HostConnection::builder()
            .host("local")
            .become_argv(vec!["env".to_string()])
            .build();
        executor
            .run(&connection, &RemoteCommand::argv(["true"]), OutputSink::Discard, &ExecOptions::default())
            .unwrap();
        assert_eq!(shell.calls(), vec![vec!["env".to_string(), "true".to_string()]]);
    }

    #[test]
    fn test_timeout_kills_command() {
        let executor = executor(Arc::new(LocalShell::default()), false);
        let options = ExecOptions::builder().timeout(Duration::from_millis(200)).build();
        let result = executor
            .run(&connection(), &RemoteCommand::argv(["sleep", "5"]), OutputSink::Discard, &options)
            .unwrap();
        assert!(result.timed_out);
        assert!(!result.success());
    }

    #[test]
    fn test_simulate_spawns_nothing() {
        let shell = Arc::new(LocalShell::default());
        let executor = executor(shell.clone(), true);
        let result = executor
            .run(&connection(), &RemoteCommand::argv(["false"]), OutputSink::Discard, &ExecOptions::default())
            .unwrap();
        assert!(result.success());
        assert!(result.simulated);
        assert!(shell.calls().is_empty());
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let shell = Arc::new(LocalShell::default().unreachable("local"));
        let executor = executor(shell, false);
        let err = executor
            .run(&connection(), &RemoteCommand::argv(["true"]), OutputSink::Discard, &ExecOptions::default())
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_truncated_label() {
        assert_eq!(truncated("ls -l"), "ls -l");
        assert_eq!(truncated("a\nb"), "a...");
        assert_eq!(truncated(&"x".repeat(80)).len(), 63);
    }
}
