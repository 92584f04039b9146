//! Captures one target into one artifact.
//!
//! The remote command's stdout goes either straight into `<artifact>.tmp` or
//! through the local encryption filter first; the two processes are joined by
//! an OS pipe, so a slow filter throttles the remote side. The temporary file
//! is renamed only once both stages are done and their exit statuses allow it.

use crate::backup::artifact::{
    artifact_path, tmp_path, ArtifactResult, MIN_ARTIFACT_SIZE, PARTIAL_READ_EXIT_CODE,
};
use crate::backup::capture::{incremental_archive_command, CaptureMethod};
use crate::backup::context::RunContext;
use crate::backup::encrypt::Encryptor;
use crate::backup::file_ext::{joined_ext, FileExtProvider};
use crate::backup::incremental::{find_changed, listing_command, Selection};
use crate::backup::job::{BackupTarget, JobSpec};
use crate::backup::remote::{ExecResult, OutputSink, RemoteCommand};
use crate::backup::report::pretty_size;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Exit statuses of the stages that produced an artifact.
struct StageResults {
    capture: ExecResult,
    encrypt: Option<ExecResult>,
}

pub fn capture(ctx: &RunContext, job: &JobSpec, target: &BackupTarget) -> Result<ArtifactResult> {
    let host = job.host().as_str();
    let method = CaptureMethod::for_target(target, ctx.window());
    let stages: [&dyn FileExtProvider; 2] = [&method, job.encryptor()];
    let path = artifact_path(
        ctx.settings().destdir(),
        &ctx.date_stamp(),
        host,
        target.name(),
        &joined_ext(stages),
    );

    if ctx.is_simulate() {
        let label = match method.remote_command() {
            Some(command) => command.label(),
            None => listing_command(target.name(), ctx.window()).label(),
        };
        ctx.events().info(
            host,
            format!("Simulate backup of {}:'{}' to {:?}", host, label, path),
        );
        return Ok(ArtifactResult::simulated(host, target.area(), target.name(), Some(path)));
    }

    let command = match method.remote_command() {
        Some(command) => command.for_window(ctx.window()),
        None => match find_changed(
            ctx.executor(),
            job.connection(),
            target.name(),
            ctx.window(),
            &job.exec_options(),
        )? {
            Selection::Nothing => {
                ctx.events().info(
                    host,
                    format!("No file changed under {}, nothing to back up", target.name()),
                );
                return Ok(ArtifactResult::skipped(
                    host,
                    target.area(),
                    target.name(),
                    "no changes",
                ));
            }
            Selection::Failed(result) => {
                let detail = format!("listing changed files failed, {}", result.describe());
                ctx.events().error(host, format!("Backup of {} failed: {}", target.name(), detail));
                return Ok(ArtifactResult::failed(host, target.area(), target.name(), detail));
            }
            Selection::Files(files) => {
                ctx.events().info(
                    host,
                    format!("{} changed files under {}", files.len(), target.name()),
                );
                incremental_archive_command(&files)
            }
        },
    };

    let tmp = tmp_path(&path);
    match write_artifact(ctx, job, &command, &tmp)
        .and_then(|stages| finish_artifact(ctx, job, target, stages, &tmp, path))
    {
        Ok(result) => {
            if !*result.success() {
                remove_tmp(&tmp);
            }
            Ok(result)
        }
        // the host is gone, the runner gives up on the phase
        Err(e) if e.is_transport() => {
            remove_tmp(&tmp);
            Err(e)
        }
        // local trouble (artifact file, encryption binary) only costs this target
        Err(e) => {
            remove_tmp(&tmp);
            let detail = e.to_string();
            ctx.events()
                .error(host, format!("Backup of {} failed: {}", target.name(), detail));
            Ok(ArtifactResult::failed(host, target.area(), target.name(), detail))
        }
    }
}

fn write_artifact(
    ctx: &RunContext,
    job: &JobSpec,
    command: &RemoteCommand,
    tmp: &Path,
) -> Result<StageResults> {
    let options = job.exec_options();
    let file = File::create(tmp)
        .map_err(Error::from)
        .with_msg(format!("Cannot create artifact {:?}", tmp))?;

    let gpg = match job.encryptor() {
        Encryptor::None => {
            let capture = ctx
                .executor()
                .run(job.connection(), command, OutputSink::File(file), &options)?;
            return Ok(StageResults {
                capture,
                encrypt: None,
            });
        }
        Encryptor::Gpg(gpg) => gpg,
    };

    let Some(mut process) = ctx
        .executor()
        .spawn(job.connection(), command, OutputSink::Pipe, &options)?
    else {
        return Ok(StageResults {
            capture: ExecResult::simulated(),
            encrypt: None,
        });
    };
    let stdout = process
        .take_stdout()
        .ok_or_else(|| Error::from(std::io::Error::other("capture stdout is not piped")))?;
    let encrypter = match gpg.spawn(
        job.host(),
        stdout,
        file,
        ctx.events().clone(),
        options.timeout,
    ) {
        Ok(encrypter) => encrypter,
        Err(e) => {
            // the capture sees a closed pipe and exits
            let _ = process.wait();
            return Err(Error::from(e).with_msg("Cannot start encryption"));
        }
    };
    // both are reaped before either error is returned
    let capture = process.wait();
    let encrypt = encrypter.wait()?;
    let capture = match capture {
        Ok(capture) => capture,
        // A filter that quits early kills the remote side with SIGPIPE, which
        // ssh reports like a lost connection. The filter failure is the cause.
        Err(e) if !encrypt.success() => ExecResult {
            stderr_tail: vec![e.to_string()],
            ..Default::default()
        },
        Err(e) => return Err(e),
    };
    Ok(StageResults {
        capture,
        encrypt: Some(encrypt),
    })
}

/// Applies the exit status rules, then moves and checks the artifact.
fn finish_artifact(
    ctx: &RunContext,
    job: &JobSpec,
    target: &BackupTarget,
    stages: StageResults,
    tmp: &Path,
    path: PathBuf,
) -> Result<ArtifactResult> {
    let host = job.host().as_str();
    let name = target.name();
    let fail = |detail: String| {
        ctx.events()
            .error(host, format!("Backup of {} failed: {}", name, detail));
        Ok(ArtifactResult::failed(host, target.area(), name, detail))
    };

    if let Some(encrypt) = &stages.encrypt {
        if !encrypt.success() {
            return fail(format!("encryption failed, {}", encrypt.describe()));
        }
    }
    let capture = &stages.capture;
    if !capture.success() {
        let partial = stages.encrypt.is_some()
            && !capture.timed_out
            && capture.exit_code == Some(PARTIAL_READ_EXIT_CODE);
        if !partial {
            return fail(format!("capture failed, {}", capture.describe()));
        }
        ctx.events().error(
            host,
            format!("Backup of {} is partial: {}", name, capture.describe()),
        );
    }

    let size = match std::fs::metadata(tmp) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return fail(format!("artifact {:?} is missing", path));
        }
        Err(e) => return Err(e.into()),
    };
    if size == 0 {
        return fail(format!("artifact {:?} is empty", path));
    }
    std::fs::rename(tmp, &path)
        .map_err(Error::from)
        .with_msg(format!("Cannot move artifact into place: {:?}", path))?;

    if size < MIN_ARTIFACT_SIZE {
        ctx.events().warn(
            host,
            format!("Artifact {:?} is only {}", path, pretty_size(size)),
        );
    }
    ctx.events()
        .info(host, format!("Saved {:?} ({})", path, pretty_size(size)));
    Ok(ArtifactResult::succeeded(host, target.area(), name, path, size))
}

fn remove_tmp(tmp: &Path) {
    if let Err(e) = std::fs::remove_file(tmp) {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("Cannot remove {:?}: {}", tmp, e);
        }
    }
}
