//! Structured record of what happened during a run.
//!
//! Every entry is emitted through `tracing` as well, the list itself is what
//! the report renders below the result table.

use chrono::{DateTime, Local};
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl Display for EventLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EventLevel::Info => write!(f, "INFO"),
            EventLevel::Warn => write!(f, "WARN"),
            EventLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub level: EventLevel,
    pub host: Option<String>,
    pub message: String,
}

impl Display for LogEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.host {
            Some(host) => write!(f, "[{}] {}", host, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<LogEvent>>,
}

impl EventLog {
    pub fn note<M: Into<String>>(&self, level: EventLevel, host: Option<&str>, message: M) {
        let event = LogEvent {
            timestamp: Local::now(),
            level,
            host: host.map(str::to_string),
            message: message.into(),
        };
        match level {
            EventLevel::Info => tracing::info!("{event}"),
            EventLevel::Warn => tracing::warn!("{event}"),
            EventLevel::Error => tracing::error!("{event}"),
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn info<M: Into<String>>(&self, host: &str, message: M) {
        self.note(EventLevel::Info, Some(host), message)
    }

    pub fn warn<M: Into<String>>(&self, host: &str, message: M) {
        self.note(EventLevel::Warn, Some(host), message)
    }

    pub fn error<M: Into<String>>(&self, host: &str, message: M) {
        self.note(EventLevel::Error, Some(host), message)
    }

    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
