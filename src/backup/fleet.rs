use crate::backup::artifact::ArtifactResult;
use crate::backup::context::RunContext;
use crate::backup::events::EventLevel;
use crate::backup::host::HostSelector;
use crate::backup::notifications::deliver_reports;
use crate::backup::plan::BackupPlan;
use crate::backup::result_error::result::Result;
use crate::backup::runner::HostRunner;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

/// Runs every selected host and reports the results.
pub struct FleetDriver<'a> {
    ctx: &'a RunContext,
    plan: &'a BackupPlan,
}

impl<'a> FleetDriver<'a> {
    pub fn new(ctx: &'a RunContext, plan: &'a BackupPlan) -> Self {
        FleetDriver { ctx, plan }
    }

    /// Backs up `hosts`, or every plan host when none are given, and returns
    /// the run verdict.
    pub fn run(&self, hosts: &[HostSelector]) -> Result<bool> {
        let selected = if hosts.is_empty() {
            self.plan.host_keys().map(HostSelector::from_key).collect()
        } else {
            hosts.to_vec()
        };

        let jobs = *self.ctx.settings().jobs();
        if jobs > 1 && selected.len() > 1 {
            tracing::info!("Backing up {} hosts, {} at a time", selected.len(), jobs);
            let pool = ThreadPoolBuilder::new().num_threads(jobs).build()?;
            pool.install(|| selected.par_iter().for_each(|host| self.run_host(host)));
        } else {
            selected.iter().for_each(|host| self.run_host(host));
        }

        if self.ctx.is_simulate() {
            tracing::info!("Simulation, no report is sent");
        } else {
            deliver_reports(self.ctx, &self.plan.smtp());
        }
        Ok(self.ctx.results().overall_verdict())
    }

    /// A host whose job cannot run leaves exactly one failed record behind.
    fn run_host(&self, selector: &HostSelector) {
        let key = selector.key().as_str();
        let result = self
            .plan
            .job_for(selector)
            .and_then(|job| HostRunner::new(self.ctx, &job).run());
        if let Err(e) = result {
            self.ctx.events().note(
                EventLevel::Error,
                Some(key),
                format!("FATAL error on backup of {}: {}", key, e),
            );
            self.ctx
                .results()
                .record(&self.plan.recipients_for(key), ArtifactResult::host_fatal(key, e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::artifact::Area;
    use crate::backup::context::RunSettings;
    use crate::backup::remote::local::LocalShell;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn plan_for(source: &Path, report: &Path) -> BackupPlan {
        let yaml = format!(
            r#"
default:
  mailto: ["{report}"]
  pre: ["true"]
okhost:
  paths: ["{source}/data.txt"]
badhost:
  paths: ["{source}/missing.txt"]
"#,
            report = report.display(),
            source = source.display()
        );
        let plan: BackupPlan = serde_yml::from_str(&yaml).unwrap();
        plan.check().unwrap();
        plan
    }

    fn setup() -> (TempDir, TempDir) {
        let source = TempDir::new().unwrap();
        std::fs::write(source.path().join("data.txt"), "y".repeat(4096)).unwrap();
        (source, TempDir::new().unwrap())
    }

    fn context(shell: Arc<LocalShell>, dest: &TempDir, simulate: bool, jobs: usize) -> RunContext {
        RunContext::new(
            shell,
            RunSettings::builder()
                .destdir(dest.path())
                .simulate(simulate)
                .jobs(jobs)
                .build(),
        )
    }

    #[test]
    fn test_two_hosts_one_failure() {
        let (source, dest) = setup();
        let report = source.path().join("report.html");
        let plan = plan_for(source.path(), &report);
        let ctx = context(Arc::new(LocalShell::default()), &dest, false, 1);

        assert!(!FleetDriver::new(&ctx, &plan).run(&[]).unwrap());

        let targets = ctx
            .results()
            .records()
            .into_iter()
            .filter(|r| *r.area() == Area::Path)
            .map(|r| (r.host().clone(), *r.success()))
            .collect::<Vec<_>>();
        assert_eq!(
            targets,
            vec![("okhost".to_string(), true), ("badhost".to_string(), false)]
        );

        let html = std::fs::read_to_string(&report).unwrap();
        assert!(html.contains(": Error</h1>"));
        assert_eq!(html.matches(">OK</td>").count(), 3);
        assert_eq!(html.matches(">ERROR</td>").count(), 1);
    }

    #[test]
    fn test_host_fatal_does_not_stop_others() {
        let (source, dest) = setup();
        let report = source.path().join("report.html");
        let plan = plan_for(source.path(), &report);
        let ctx = context(Arc::new(LocalShell::default()), &dest, false, 1);
        let hosts = vec![
            HostSelector::from_key("ghost"),
            HostSelector::from_key("okhost"),
        ];

        assert!(!FleetDriver::new(&ctx, &plan).run(&hosts).unwrap());
        let records = ctx.results().records();
        let fatal = records.iter().filter(|r| r.host() == "ghost").collect::<Vec<_>>();
        assert_eq!(fatal.len(), 1);
        assert_eq!(*fatal[0].area(), Area::Host);
        assert_eq!(fatal[0].name(), "*");
        assert!(!*fatal[0].success());
        assert!(records
            .iter()
            .any(|r| r.host() == "okhost" && *r.area() == Area::Path && *r.success()));
        // the unknown host reports to the default recipients
        assert!(std::fs::read_to_string(&report).unwrap().contains("ghost"));
    }

    #[test]
    fn test_parallel_hosts() {
        let (source, dest) = setup();
        let report = source.path().join("report.html");
        let plan = plan_for(source.path(), &report);
        let ctx = context(Arc::new(LocalShell::default()), &dest, false, 4);

        assert!(!FleetDriver::new(&ctx, &plan).run(&[]).unwrap());
        let records = ctx.results().records();
        assert_eq!(records.len(), 4);
        for host in ["okhost", "badhost"] {
            let areas = records
                .iter()
                .filter(|r| r.host() == host)
                .map(|r| *r.area())
                .collect::<Vec<_>>();
            assert_eq!(areas, vec![Area::Pre, Area::Path]);
        }
    }

    #[test]
    fn test_simulate_everything_succeeds() {
        let (source, dest) = setup();
        let report = source.path().join("report.html");
        let plan = plan_for(source.path(), &report);
        let shell = Arc::new(LocalShell::default());
        let ctx = context(shell.clone(), &dest, true, 1);

        assert!(FleetDriver::new(&ctx, &plan).run(&[]).unwrap());
        assert!(shell.calls().is_empty());
        assert_eq!(ctx.results().records().len(), 4);
        assert!(!report.exists());
        assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
    }
}
