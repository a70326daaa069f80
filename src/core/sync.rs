/*!
 * Per-series incremental sync
 *
 * One sync attempt moves a single series forward: discover the watermark
 * from the destination, fetch everything strictly newer from the source,
 * write it back in one batch. The watermark is recomputed from the
 * destination on every attempt, never cached, so a crash mid-batch
 * self-corrects on the next cycle.
 *
 * Known limitation, inherited from the watermark protocol and deliberately
 * not worked around: replication is only complete when source timestamps
 * for a series are non-decreasing in wall-clock-of-insertion order. A point
 * inserted at the source below the current watermark is permanently
 * skipped; a point far in the future is copied once and then shadows
 * correctly-timed points until real time passes it.
 */

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::store::{StoreClient, StoreError, StoreTarget};

/// One replicated series: its name and the pair of stores it moves between
#[derive(Debug, Clone)]
pub struct SeriesSpec {
    pub series: String,
    pub source: StoreTarget,
    pub dest: StoreTarget,
}

/// Result of one successful sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Source had nothing newer than the watermark
    NoChange,

    /// This many points were fetched and written
    Synced(usize),
}

/// A failed sync attempt, scoped to one series for one cycle
#[derive(Debug)]
pub struct SyncError {
    pub series: String,
    pub cause: StoreError,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sync of '{}' failed: {}", self.series, self.cause)
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Sync one series once.
///
/// Every transport failure on either side becomes a [`SyncError`] carrying
/// the series name; the caller isolates it from sibling series.
pub fn sync_series<C: StoreClient + ?Sized>(
    client: &C,
    spec: &SeriesSpec,
    recovery: DateTime<Utc>,
) -> Result<SyncOutcome, SyncError> {
    let fail = |cause: StoreError| SyncError {
        series: spec.series.clone(),
        cause,
    };

    // The destination is the source of truth for what has already arrived.
    let watermark = client
        .latest_timestamp(&spec.dest, &spec.series)
        .map_err(fail)?
        .unwrap_or(recovery);
    debug!(series = %spec.series, %watermark, "querying source for new points");

    let points = client
        .query_after(&spec.source, &spec.series, watermark)
        .map_err(fail)?;

    if points.is_empty() {
        debug!(series = %spec.series, "nothing newer than watermark");
        return Ok(SyncOutcome::NoChange);
    }

    let count = points.len();
    client
        .write(&spec.dest, &spec.series, &points)
        .map_err(fail)?;

    debug!(series = %spec.series, count, "batch written");
    Ok(SyncOutcome::Synced(count))
}
