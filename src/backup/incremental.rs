//! Incremental selection: which regular files under a remote directory
//! changed inside the window.

use crate::backup::host::HostConnection;
use crate::backup::remote::{ExecOptions, ExecResult, OutputSink, RemoteCommand, RemoteExecutor};
use crate::backup::result_error::result::Result;
use crate::backup::validate::validate_positive_days;

/// Day window used by `--incremental`
pub static DEFAULT_INCREMENTAL_DAYS: f64 = 1.0;
/// `find` exits 1 when part of the tree could not be read; the listing is
/// still usable as long as it produced something
static PARTIAL_LISTING_EXIT_CODE: i32 = 1;
static MINUTES_PER_DAY: f64 = 24.0 * 60.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum IncrementalWindow {
    #[default]
    Disabled,
    /// Changed within the last `days` (fractions allowed)
    Since(f64),
}

impl IncrementalWindow {
    /// `--full` wins over `--since`, which wins over `--incremental`.
    pub fn from_flags(incremental: bool, since: Option<f64>, full: bool) -> Result<Self> {
        if full {
            return Ok(IncrementalWindow::Disabled);
        }
        match since {
            Some(days) => {
                validate_positive_days(days)?;
                Ok(IncrementalWindow::Since(days))
            }
            None if incremental => Ok(IncrementalWindow::Since(DEFAULT_INCREMENTAL_DAYS)),
            None => Ok(IncrementalWindow::Disabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, IncrementalWindow::Since(_))
    }

    pub fn days(&self) -> Option<f64> {
        match self {
            IncrementalWindow::Disabled => None,
            IncrementalWindow::Since(days) => Some(*days),
        }
    }

    /// Whole minutes covering the window, rounded up, never zero.
    pub fn minutes(&self) -> Option<u64> {
        self.days()
            .map(|days| ((days * MINUTES_PER_DAY).ceil() as u64).max(1))
    }
}

/// Remote paths exactly as listed, byte for byte.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangedFiles(Vec<Vec<u8>>);

impl ChangedFiles {
    pub fn from_null_separated(output: &[u8]) -> Self {
        ChangedFiles(
            output
                .split(|b| *b == 0)
                .filter(|p| !p.is_empty())
                .map(<[u8]>::to_vec)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &[u8]> {
        self.0.iter().map(Vec::as_slice)
    }

    /// The list in the form `tar --null -T -` reads.
    pub fn to_null_separated(&self) -> Vec<u8> {
        self.paths()
            .flat_map(|p| p.iter().copied().chain(std::iter::once(0)))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// Nothing changed: the target is skipped, not failed
    Nothing,
    Files(ChangedFiles),
    Failed(ExecResult),
}

pub fn listing_command(path: &str, window: &IncrementalWindow) -> RemoteCommand {
    let mut argv = vec!["find".to_string(), path.to_string(), "-type".into(), "f".into()];
    if let Some(minutes) = window.minutes() {
        argv.push("-mmin".into());
        argv.push(format!("-{minutes}"));
    }
    argv.push("-print0".into());
    RemoteCommand::argv(argv)
}

/// Lists regular files under `path` modified inside `window`; a disabled
/// window lists every regular file.
pub fn find_changed(
    executor: &RemoteExecutor,
    connection: &HostConnection,
    path: &str,
    window: &IncrementalWindow,
    options: &ExecOptions,
) -> Result<Selection> {
    let (result, output) = executor.run_captured(
        connection,
        &listing_command(path, window),
        OutputSink::Pipe,
        options,
    )?;

    let files = ChangedFiles::from_null_separated(&output);
    let partial = !result.timed_out
        && result.exit_code == Some(PARTIAL_LISTING_EXIT_CODE)
        && !files.is_empty();
    if partial {
        executor.events().warn(
            connection.host(),
            format!("Listing of {} was incomplete: {}", path, result.describe()),
        );
    } else if !result.success() {
        return Ok(Selection::Failed(result));
    }

    if files.is_empty() {
        Ok(Selection::Nothing)
    } else {
        Ok(Selection::Files(files))
    }
}
