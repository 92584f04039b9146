//! A spawned stage of a capture pipeline (remote shell or local filter) with
//! its stdin feeder, stderr reader and deadline.

use crate::backup::events::EventLog;
use crate::backup::remote::{ExecResult, RemoteShell};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// stderr lines kept for the result, older ones are only in the log
pub static STDERR_TAIL_LINES: usize = 20;
static POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long pipe threads may still run after a deadline kill; a grandchild of
/// the killed process can hold the pipe open well beyond it
static KILL_GRACE: Duration = Duration::from_secs(2);

pub enum ProcessInput {
    Null,
    Bytes(Arc<[u8]>),
    Stdio(Stdio),
}

pub struct StreamProcess {
    host: String,
    child: Child,
    stdin_writer: Option<JoinHandle<std::io::Result<()>>>,
    stderr_reader: Option<JoinHandle<Vec<String>>>,
    deadline: Option<Instant>,
    transport: Option<Arc<dyn RemoteShell>>,
}

impl StreamProcess {
    pub fn start<H: Into<String>>(
        host: H,
        mut command: Command,
        input: ProcessInput,
        stdout: Stdio,
        events: Arc<EventLog>,
        timeout: Option<Duration>,
        transport: Option<Arc<dyn RemoteShell>>,
    ) -> std::io::Result<Self> {
        let host = host.into();
        let (stdin, bytes) = match input {
            ProcessInput::Null => (Stdio::null(), None),
            ProcessInput::Bytes(bytes) => (Stdio::piped(), Some(bytes)),
            ProcessInput::Stdio(stdio) => (stdio, None),
        };
        let mut child = command
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()?;
        // `command` still owns the parent's copies of the handed-over descriptors
        drop(command);

        let stdin_writer = match (child.stdin.take(), bytes) {
            (Some(mut pipe), Some(bytes)) => Some(std::thread::spawn(move || {
                pipe.write_all(&bytes)
            })),
            _ => None,
        };
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_logger(host.clone(), stderr, events));

        Ok(StreamProcess {
            host,
            child,
            stdin_writer,
            stderr_reader,
            deadline: timeout.map(|t| Instant::now() + t),
            transport,
        })
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Waits for exit or the deadline, whichever comes first; a process still
    /// running at the deadline is killed.
    pub fn wait(mut self) -> Result<ExecResult> {
        let (status, timed_out) = wait_with_deadline(&mut self.child, self.deadline)?;

        if let Some(Err(e)) = self
            .stdin_writer
            .take()
            .and_then(|handle| join_pipe_thread(handle, timed_out))
        {
            // a command may legitimately exit before reading all of its input
            if e.kind() != ErrorKind::BrokenPipe {
                tracing::warn!("[{}] Writing command input failed: {}", self.host, e);
            }
        }
        let stderr_tail = self
            .stderr_reader
            .take()
            .and_then(|handle| join_pipe_thread(handle, timed_out))
            .unwrap_or_default();

        if let Some(shell) = &self.transport {
            if !timed_out && shell.is_transport_failure(&status) {
                let reason = match stderr_tail.last() {
                    Some(line) => format!("remote shell exited with {status}: {line}"),
                    None => format!("remote shell exited with {status}"),
                };
                return Err(Error::transport(&self.host, reason));
            }
        }

        Ok(ExecResult {
            exit_code: status.code(),
            timed_out,
            simulated: false,
            stderr_tail,
        })
    }
}

pub fn wait_with_deadline(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<(ExitStatus, bool)> {
    let Some(deadline) = deadline else {
        return child.wait().map(|status| (status, false));
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            // already exited between the two calls is fine
            let _ = child.kill();
            return child.wait().map(|status| (status, true));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Joins a thread serving one of the process pipes. After a deadline kill it
/// is given [`KILL_GRACE`] to finish, then left behind detached.
pub fn join_pipe_thread<T>(handle: JoinHandle<T>, timed_out: bool) -> Option<T> {
    if timed_out {
        let grace_end = Instant::now() + KILL_GRACE;
        while !handle.is_finished() {
            if Instant::now() >= grace_end {
                tracing::warn!("Pipe still open after the process was killed, not waiting for it");
                return None;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
    handle.join().ok()
}

fn spawn_stderr_logger(
    host: String,
    stderr: ChildStderr,
    events: Arc<EventLog>,
) -> JoinHandle<Vec<String>> {
    std::thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line).trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    events.warn(&host, format!("[stderr] {text}"));
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(text);
                }
            }
        }
        tail.into_iter().collect()
    })
}
