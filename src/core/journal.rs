/*!
 * Database-backed service journal
 *
 * Operational records land in the reserved `Logging` bucket on the
 * destination store, measurement `Logs`, tagged with their severity. The
 * journal is strictly fire-and-forget: a failed write degrades to a
 * terminal warning and is never retried, so an unreachable destination
 * cannot spiral into a loop of failures reporting failures. Nothing in
 * this service ever reads the journal back.
 */

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::JOURNAL_BUCKET;
use crate::store::{DataPoint, FieldValue, StoreClient, StoreTarget};

/// Measurement name journal records are written under
pub const JOURNAL_MEASUREMENT: &str = "Logs";

/// Severity of a journal record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warning,
    Error,
}

impl Severity {
    /// Tag value, upper-case by convention so records sort and filter
    /// consistently in dashboards
    pub fn as_tag(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// One journal record
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub time: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

impl LogRecord {
    pub fn now(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            severity,
            message: message.into(),
        }
    }

    fn to_point(&self) -> DataPoint {
        DataPoint::new(JOURNAL_MEASUREMENT, self.time)
            .tag("LOG_LEVEL", self.severity.as_tag())
            .field("Message", FieldValue::Text(self.message.clone()))
    }
}

/// Best-effort writer of journal records
pub struct Journal<'c, C: StoreClient + ?Sized> {
    client: &'c C,
    dest: StoreTarget,
}

impl<'c, C: StoreClient + ?Sized> Journal<'c, C> {
    pub fn new(client: &'c C, dest: StoreTarget) -> Self {
        Self { client, dest }
    }

    /// Write one record; swallow the failure if the write itself fails
    pub fn log(&self, record: LogRecord) {
        let point = record.to_point();
        if let Err(e) = self
            .client
            .write(&self.dest, JOURNAL_BUCKET, std::slice::from_ref(&point))
        {
            warn!(error = %e, message = %record.message, "journal write failed, record dropped");
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogRecord::now(Severity::Debug, message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogRecord::now(Severity::Warning, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogRecord::now(Severity::Error, message));
    }
}
