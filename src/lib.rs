/*!
 * Tidemark - watermark-based time-series mirroring
 *
 * Incrementally replicates buckets from a remote time-series store to a
 * local one over an unstable link:
 * - Watermark-based incremental sync, recomputed from the destination
 * - Connectivity probing with a fixed cooldown between cycles
 * - Crash-aware single-instance guard
 * - Best-effort service journal in a reserved bucket
 *
 * Version: 0.3.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod store;

// Re-export commonly used types
pub use config::{MirrorConfig, JOURNAL_BUCKET};
pub use crate::core::{CancelFlag, InstanceGuard, MirrorLoop, SeriesSpec, SyncOutcome};
pub use error::{MirrorError, Result};
pub use store::{DataPoint, FieldValue, HttpStoreClient, StoreClient, StoreTarget};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
