use crate::backup::context::RunContext;
use crate::backup::notifications::file::FileNotification;
use crate::backup::notifications::smtp::{SmtpNotification, SmtpSettings};
use crate::backup::report::Report;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use derive_more::From;
use lettre::message::Mailbox;
use std::fmt::Display;

pub mod file;
pub mod smtp;

pub trait Notification {
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()>;
}

/// Where one report recipient's report goes.
#[derive(Clone, Debug, From)]
pub enum ReportTarget {
    Smtp(SmtpNotification),
    File(FileNotification),
}

impl ReportTarget {
    /// An address containing `@` is mailed, anything else is a file path.
    pub fn for_recipient(recipient: &str, smtp: &SmtpSettings) -> Result<Self> {
        if recipient.contains('@') {
            let to = recipient.parse::<Mailbox>().map_err(Error::from)?;
            Ok(SmtpNotification::new(smtp.clone(), to).into())
        } else {
            Ok(FileNotification::new(recipient).into())
        }
    }
}

impl Notification for ReportTarget {
    fn send<D1: Display, D2: Display>(&self, topic: D1, msg: D2) -> Result<()> {
        match self {
            Self::Smtp(inner) => inner.send(topic, msg),
            Self::File(inner) => inner.send(topic, msg),
        }
    }
}

/// Sends every recipient its report. Failures are logged, never returned:
/// they do not change the run verdict.
pub fn deliver_reports(ctx: &RunContext, smtp: &SmtpSettings) -> usize {
    let verdict = ctx.results().overall_verdict();
    let events = ctx.events().snapshot();
    let mut delivered = 0;
    for (recipient, records) in ctx.results().by_recipient() {
        let report = Report::new(
            ctx.window().is_enabled(),
            *ctx.settings().started(),
            verdict,
            &records,
            &events,
        );
        match ReportTarget::for_recipient(&recipient, smtp)
            .and_then(|target| target.send(report.title(), report.html()))
        {
            Ok(()) => delivered += 1,
            Err(e) => tracing::error!("Report delivery to {} failed: {}", recipient, e),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::artifact::{Area, ArtifactResult};
    use crate::backup::context::RunSettings;
    use crate::backup::remote::local::LocalShell;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_recipient_kinds() {
        let smtp = SmtpSettings::default();
        assert!(matches!(
            ReportTarget::for_recipient("ops@example.com", &smtp).unwrap(),
            ReportTarget::Smtp(_)
        ));
        assert!(matches!(
            ReportTarget::for_recipient("/var/log/backup.html", &smtp).unwrap(),
            ReportTarget::File(_)
        ));
        assert!(ReportTarget::for_recipient("not an@address@", &smtp).is_err());
    }

    #[test]
    fn test_deliver_reports_to_files() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("ops.html");
        let bad = dir.path().join("missing/dba.html");
        let ctx = RunContext::new(
            Arc::new(LocalShell::default()),
            RunSettings::builder().destdir(dir.path()).build(),
        );
        ctx.results().record(
            &[good.display().to_string()],
            ArtifactResult::succeeded("db1", Area::Path, "/etc/", dir.path().join("x"), 4096),
        );
        ctx.results().record(
            &[bad.display().to_string()],
            ArtifactResult::failed("web1", Area::Pre, "sync", "exit code 1"),
        );

        // the unwritable recipient is logged and skipped
        assert_eq!(deliver_reports(&ctx, &SmtpSettings::default()), 1);
        let written = std::fs::read_to_string(&good).unwrap();
        assert!(written.starts_with("<h1>Backup results for "));
        assert!(written.contains(": Error</h1>"));
        assert!(written.contains("db1"));
        assert!(!written.contains("web1"));
    }
}
