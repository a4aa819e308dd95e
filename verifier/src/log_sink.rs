//! Log sink: the user-visible verification log and the notification channel.
//!
//! Every append is mirrored into `tracing` so the process log carries the
//! same history as the host's output panel.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::host::HostSurface;
use crate::types::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }
}

impl From<Severity> for LogLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => Self::Info,
            Severity::Warning => Self::Warn,
            Severity::Error => Self::Error,
            Severity::Debug => Self::Debug,
        }
    }
}

/// One line of the verification log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    message: String,
}

impl LogEntry {
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), level, message)
    }

    #[must_use]
    pub fn at(timestamp: DateTime<Utc>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level.label(),
            self.message
        )
    }
}

/// Append to the host log.
pub(crate) fn log<H: HostSurface + ?Sized>(host: &mut H, level: LogLevel, message: impl Into<String>) {
    let entry = LogEntry::new(level, message);
    match level {
        LogLevel::Info => tracing::info!(target: "hypra::log", "{}", entry.message()),
        LogLevel::Warn => tracing::warn!(target: "hypra::log", "{}", entry.message()),
        LogLevel::Error => tracing::error!(target: "hypra::log", "{}", entry.message()),
        LogLevel::Debug => tracing::debug!(target: "hypra::log", "{}", entry.message()),
    }
    host.append_log(&entry);
}

/// Append to the host log and show the same text as a notification.
pub(crate) fn broadcast<H: HostSurface + ?Sized>(host: &mut H, level: LogLevel, message: impl Into<String>) {
    let message = message.into();
    host.notify(level, &message);
    log(host, level, message);
}
