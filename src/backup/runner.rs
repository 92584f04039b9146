//! One host's job: pre-hooks, targets, post-hooks.
//!
//! Failures are recorded and the job moves on. A transport failure gives up on
//! the rest of the current phase only, post-hooks are always attempted. Any
//! other error is returned to the caller once post-hooks have run.

use crate::backup::artifact::{Area, ArtifactResult};
use crate::backup::context::RunContext;
use crate::backup::job::{BackupTarget, JobSpec};
use crate::backup::pipeline;
use crate::backup::remote::{ExecResult, OutputSink, RemoteCommand};
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithDebugObjectAndFnName;
use itertools::Itertools;

static SKIPPED_AFTER_TRANSPORT: &str = "skipped, host unreachable";

pub struct HostRunner<'a> {
    ctx: &'a RunContext,
    job: &'a JobSpec,
}

impl<'a> HostRunner<'a> {
    pub fn new(ctx: &'a RunContext, job: &'a JobSpec) -> Self {
        HostRunner { ctx, job }
    }

    /// True when every step of the host succeeded.
    pub fn run(&self) -> Result<bool> {
        let host = self.job.host().as_str();
        let events = self.ctx.events();
        events.info(host, format!("Starting backup of {}", host));

        let pre = self.run_hooks(Area::Pre, self.job.pre());
        if let Ok(failures @ 1..) = pre {
            events.error(
                host,
                format!("{} pre-hook(s) failed, backup of {} is degraded", failures, host),
            );
        }
        let targets = match &pre {
            Ok(_) => self.run_targets(),
            Err(_) => Ok(0),
        };
        let post = self.run_hooks(Area::Post, self.job.post());

        let (failures, errors): (Vec<usize>, Vec<_>) =
            [pre, targets, post].into_iter().partition_result();
        convert_error_vec(errors).with_debug_object_and_fn_name(host.to_string(), "run")?;

        let failures: usize = failures.into_iter().sum();
        if failures == 0 {
            events.info(host, format!("Backup of {} finished", host));
        } else {
            events.error(
                host,
                format!("Backup of {} finished with {} failure(s)", host, failures),
            );
        }
        Ok(failures == 0)
    }

    fn run_hooks(&self, area: Area, hooks: &[RemoteCommand]) -> Result<usize> {
        let mut failures = 0;
        for (i, hook) in hooks.iter().enumerate() {
            match self.run_hook(hook) {
                Ok(result) => {
                    let record = self.hook_record(area, hook, &result);
                    if !self.record(record) {
                        failures += 1;
                    }
                }
                Err(e) if e.is_transport() => {
                    self.record(ArtifactResult::failed(
                        self.job.host(),
                        area,
                        hook.label(),
                        e.to_string(),
                    ));
                    let skipped = hooks[i + 1..]
                        .iter()
                        .map(|rest| (area, rest.label()))
                        .collect_vec();
                    failures += 1 + self.abort_phase(&area.to_string(), &e.to_string(), skipped);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(failures)
    }

    fn run_hook(&self, hook: &RemoteCommand) -> Result<ExecResult> {
        self.ctx.executor().run(
            self.job.connection(),
            &hook.for_window(self.ctx.window()),
            OutputSink::Discard,
            &self.job.exec_options(),
        )
    }

    fn hook_record(&self, area: Area, hook: &RemoteCommand, result: &ExecResult) -> ArtifactResult {
        let host = self.job.host();
        if result.success() {
            ArtifactResult::completed(host, area, hook.label())
        } else {
            let detail = result.describe();
            self.ctx.events().error(
                host,
                format!("{} hook '{}' failed: {}", area, hook.label(), detail),
            );
            ArtifactResult::failed(host, area, hook.label(), detail)
        }
    }

    fn run_targets(&self) -> Result<usize> {
        let mut failures = 0;
        let targets = self.job.targets();
        for (i, target) in targets.iter().enumerate() {
            match pipeline::capture(self.ctx, self.job, target) {
                Ok(record) => {
                    if !self.record(record) {
                        failures += 1;
                    }
                }
                Err(e) if e.is_transport() => {
                    self.record(ArtifactResult::failed(
                        self.job.host(),
                        target.area(),
                        target.name(),
                        e.to_string(),
                    ));
                    let skipped = targets[i + 1..]
                        .iter()
                        .map(|rest: &BackupTarget| (rest.area(), rest.name().to_string()))
                        .collect_vec();
                    failures += 1 + self.abort_phase("targets", &e.to_string(), skipped);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(failures)
    }

    /// Records every remaining step of the phase as failed; returns how many.
    fn abort_phase(&self, phase: &str, reason: &str, skipped: Vec<(Area, String)>) -> usize {
        let host = self.job.host();
        self.ctx.events().error(
            host,
            format!("Giving up on the {} phase of {}: {}", phase, host, reason),
        );
        let count = skipped.len();
        for (area, name) in skipped {
            self.record(ArtifactResult::failed(host, area, name, SKIPPED_AFTER_TRANSPORT));
        }
        count
    }

    fn record(&self, record: ArtifactResult) -> bool {
        let success = *record.success();
        self.ctx.results().record(self.job.recipients(), record);
        success
    }
}
