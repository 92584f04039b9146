//! State of one run, passed explicitly to every component.

use crate::backup::events::EventLog;
use crate::backup::incremental::IncrementalWindow;
use crate::backup::remote::{RemoteExecutor, RemoteShell};
use crate::backup::report::ResultAggregator;
use bon::Builder;
use chrono::{DateTime, Local};
use getset::Getters;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct RunSettings {
    #[builder(into)]
    destdir: PathBuf,
    #[builder(default)]
    simulate: bool,
    #[builder(default)]
    window: IncrementalWindow,
    #[builder(default = Local::now())]
    started: DateTime<Local>,
    /// Hosts backed up at the same time
    #[builder(default = 1)]
    jobs: usize,
}

#[derive(Getters)]
#[getset(get = "pub")]
pub struct RunContext {
    settings: RunSettings,
    executor: RemoteExecutor,
    events: Arc<EventLog>,
    results: ResultAggregator,
}

impl RunContext {
    pub fn new(shell: Arc<dyn RemoteShell>, settings: RunSettings) -> Self {
        let events = Arc::new(EventLog::default());
        RunContext {
            executor: RemoteExecutor::new(shell, events.clone(), settings.simulate),
            settings,
            events,
            results: ResultAggregator::default(),
        }
    }

    pub fn is_simulate(&self) -> bool {
        self.settings.simulate
    }

    pub fn window(&self) -> &IncrementalWindow {
        &self.settings.window
    }

    /// Date part of every artifact name of this run.
    pub fn date_stamp(&self) -> String {
        self.settings.started.format("%Y%m%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::remote::ssh::SshShell;
    use chrono::TimeZone;

    #[test]
    fn test_run_context() {
        let started = Local.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let settings = RunSettings::builder()
            .destdir("/backups")
            .simulate(true)
            .window(IncrementalWindow::Since(2.0))
            .started(started)
            .build();
        let ctx = RunContext::new(Arc::new(SshShell::default()), settings);
        assert_eq!(ctx.date_stamp(), "20240101");
        assert!(ctx.is_simulate());
        assert!(ctx.executor().is_simulate());
        assert_eq!(ctx.window().days(), Some(2.0));
        assert_eq!(*ctx.settings().jobs(), 1);
        assert!(ctx.results().overall_verdict());
    }
}
