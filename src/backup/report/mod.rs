//! Run results: every record, per recipient and globally, and the verdict.

pub mod html;

use crate::backup::artifact::ArtifactResult;
use crate::backup::events::LogEvent;
use chrono::{DateTime, Local};
use getset::Getters;
use std::sync::{Mutex, PoisonError};

static SIZE_UNITS: [&str; 5] = ["bytes", "kib", "MiB", "GiB", "TiB"];

#[derive(Debug, Default)]
struct Records {
    all: Vec<ArtifactResult>,
    by_recipient: Vec<(String, Vec<ArtifactResult>)>,
}

#[derive(Debug, Default)]
pub struct ResultAggregator {
    records: Mutex<Records>,
}

impl ResultAggregator {
    /// Appends `record` to the global list and to each recipient's list.
    pub fn record(&self, recipients: &[String], record: ArtifactResult) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        for recipient in recipients {
            match records
                .by_recipient
                .iter_mut()
                .find(|(known, _)| known == recipient)
            {
                Some((_, list)) => list.push(record.clone()),
                None => records
                    .by_recipient
                    .push((recipient.clone(), vec![record.clone()])),
            }
        }
        records.all.push(record);
    }

    /// False as soon as one record failed.
    pub fn overall_verdict(&self) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .all
            .iter()
            .all(|r| *r.success())
    }

    pub fn records(&self) -> Vec<ArtifactResult> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .all
            .clone()
    }

    /// Recipients in the order they first received a record.
    pub fn by_recipient(&self) -> Vec<(String, Vec<ArtifactResult>)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_recipient
            .clone()
    }
}

/// What one recipient receives.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct Report {
    title: String,
    html: String,
}

impl Report {
    pub fn new(
        incremental: bool,
        started: DateTime<Local>,
        verdict: bool,
        records: &[ArtifactResult],
        events: &[LogEvent],
    ) -> Self {
        let title = format!(
            "{}Backup results for {}: {}",
            if incremental { "Incremental " } else { "" },
            started.format("%Y-%m-%d"),
            if verdict { "Ok" } else { "Error" }
        );
        Report {
            title,
            html: html::render(started, records, events),
        }
    }
}

/// `2048` is `"2.00 kib"`, anything under 1024 is a byte count.
pub fn pretty_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} {}", bytes, SIZE_UNITS[0]);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 1;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, SIZE_UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::artifact::Area;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn ok(host: &str, name: &str) -> ArtifactResult {
        ArtifactResult::succeeded(host, Area::Path, name, PathBuf::from("/b/x"), 4096)
    }

    #[test]
    fn test_pretty_size() {
        assert_eq!(pretty_size(0), "0 bytes");
        assert_eq!(pretty_size(1023), "1023 bytes");
        assert_eq!(pretty_size(2048), "2.00 kib");
        assert_eq!(pretty_size(1536 * 1024), "1.50 MiB");
        assert_eq!(pretty_size(3 * 1024 * 1024 * 1024), "3.00 GiB");
        assert_eq!(pretty_size(2048 * 1024u64.pow(4)), "2048.00 TiB");
    }

    #[test]
    fn test_records_per_recipient() {
        let aggregator = ResultAggregator::default();
        let ops = vec!["ops@example.com".to_string()];
        let both = vec!["ops@example.com".to_string(), "/tmp/report.html".to_string()];
        aggregator.record(&ops, ok("db1", "/etc/"));
        aggregator.record(&both, ok("web1", "/srv/"));
        aggregator.record(&[], ok("lonely", "/home/"));

        let by_recipient = aggregator.by_recipient();
        assert_eq!(by_recipient.len(), 2);
        assert_eq!(by_recipient[0].0, "ops@example.com");
        assert_eq!(by_recipient[0].1.len(), 2);
        assert_eq!(by_recipient[1].1[0].host(), "web1");
        assert_eq!(aggregator.records().len(), 3);
        assert!(aggregator.overall_verdict());
    }

    #[test]
    fn test_verdict_counts_records_without_recipients() {
        let aggregator = ResultAggregator::default();
        aggregator.record(&["ops@example.com".to_string()], ok("db1", "/etc/"));
        assert!(aggregator.overall_verdict());
        aggregator.record(&[], ArtifactResult::host_fatal("web1", "unreachable"));
        assert!(!aggregator.overall_verdict());
    }

    #[test]
    fn test_concurrent_records() {
        let aggregator = Arc::new(ResultAggregator::default());
        let recipients = vec!["ops@example.com".to_string()];
        std::thread::scope(|s| {
            for i in 0..8 {
                let aggregator = aggregator.clone();
                let recipients = recipients.clone();
                s.spawn(move || aggregator.record(&recipients, ok(&format!("h{i}"), "/etc/")));
            }
        });
        assert_eq!(aggregator.records().len(), 8);
        assert_eq!(aggregator.by_recipient()[0].1.len(), 8);
    }

    #[test]
    fn test_report_title() {
        let started = Local::now();
        let report = Report::new(true, started, false, &[], &[]);
        assert_eq!(
            report.title(),
            &format!("Incremental Backup results for {}: Error", started.format("%Y-%m-%d"))
        );
        let report = Report::new(false, started, true, &[], &[]);
        assert!(report.title().starts_with("Backup results for "));
        assert!(report.title().ends_with(": Ok"));
    }
}
