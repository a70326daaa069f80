/*!
 * Core mirroring operations
 */

pub mod guard;
pub mod journal;
pub mod mirror;
pub mod sync;

pub use guard::InstanceGuard;
pub use journal::{Journal, LogRecord, Severity};
pub use mirror::{CancelFlag, CycleReport, MirrorLoop, MirrorState, StepOutcome};
pub use sync::{sync_series, SeriesSpec, SyncError, SyncOutcome};
