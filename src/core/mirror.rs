/*!
 * Mirror loop
 *
 * An explicit two-state machine, looping until cancelled:
 *
 * - **Probing**: ping the remote store. Unreachable means sleep one
 *   refresh interval and probe again; an unstable uplink is the expected
 *   steady state, so an unreachable probe is never journaled as an error.
 * - **Syncing**: run every configured series through the sync engine in
 *   declaration order, isolating per-series failures, then cool down for
 *   the same interval and return to Probing.
 *
 * The cooldown is fixed; success, partial failure, and unreachable all
 * wait the same configured interval. [`MirrorLoop::step`] performs exactly
 * one transition so tests can drive the machine without sleeping.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::core::journal::Journal;
use crate::core::sync::{sync_series, SeriesSpec, SyncError, SyncOutcome};
use crate::error::Result;
use crate::store::{StoreClient, StoreTarget};

/// How long one cooldown slice sleeps before re-checking cancellation
const COOLDOWN_SLICE: Duration = Duration::from_millis(200);

/// Cooperative cancellation flag, set from a signal handler and polled at
/// every safe suspension point in the loop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrange for SIGINT and SIGTERM to raise the flag
    pub fn register_signals(&self) -> std::io::Result<()> {
        signal_hook::flag::register(signal_hook::consts::SIGINT, self.0.clone())?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, self.0.clone())?;
        Ok(())
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Which half of the loop runs next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Probing,
    Syncing,
}

/// What one [`MirrorLoop::step`] did
#[derive(Debug)]
pub enum StepOutcome {
    /// Probe succeeded; the next step syncs, with no intervening sleep
    RemoteReachable,

    /// Probe failed; still Probing, cool down before the next probe
    Unreachable,

    /// A full series pass finished; back to Probing after a cooldown
    CycleComplete(CycleReport),
}

/// Per-series results of one sync pass
#[derive(Debug, Default)]
pub struct CycleReport {
    pub results: Vec<(String, std::result::Result<SyncOutcome, SyncError>)>,
}

impl CycleReport {
    /// Total points written across the cycle
    pub fn synced_points(&self) -> usize {
        self.results
            .iter()
            .filter_map(|(_, r)| match r {
                Ok(SyncOutcome::Synced(n)) => Some(n),
                _ => None,
            })
            .sum()
    }

    /// Series that failed this cycle
    pub fn failures(&self) -> Vec<&SyncError> {
        self.results
            .iter()
            .filter_map(|(_, r)| r.as_ref().err())
            .collect()
    }
}

/// The replication loop, generic over the store client so tests can inject
/// a scripted fake.
pub struct MirrorLoop<'c, C: StoreClient + ?Sized> {
    client: &'c C,
    journal: Journal<'c, C>,
    specs: Vec<SeriesSpec>,
    remote: StoreTarget,
    recovery: DateTime<Utc>,
    cooldown: Duration,
    cancel: CancelFlag,
    state: MirrorState,
}

impl<'c, C: StoreClient + ?Sized> MirrorLoop<'c, C> {
    pub fn new(client: &'c C, config: &MirrorConfig, cancel: CancelFlag) -> Result<Self> {
        let remote = config.remote.target();
        let local = config.local.target();

        let specs = config
            .buckets
            .iter()
            .map(|bucket| SeriesSpec {
                series: bucket.clone(),
                source: remote.clone(),
                dest: local.clone(),
            })
            .collect();

        Ok(Self {
            client,
            journal: Journal::new(client, local),
            specs,
            remote,
            recovery: config.recovery_time()?,
            cooldown: config.refresh_duration()?,
            cancel,
            state: MirrorState::Probing,
        })
    }

    pub fn state(&self) -> MirrorState {
        self.state
    }

    /// Perform exactly one state transition.
    pub fn step(&mut self) -> StepOutcome {
        match self.state {
            MirrorState::Probing => {
                if self.client.ping(&self.remote) {
                    debug!("remote store reachable");
                    self.state = MirrorState::Syncing;
                    StepOutcome::RemoteReachable
                } else {
                    debug!("remote store unreachable, staying in probing");
                    StepOutcome::Unreachable
                }
            }
            MirrorState::Syncing => {
                let report = self.sync_all();
                self.state = MirrorState::Probing;
                StepOutcome::CycleComplete(report)
            }
        }
    }

    /// One pass over every configured series, in declaration order.
    ///
    /// A series failure is journaled and recorded but never stops the
    /// iteration. Cancellation is honored between series: an in-flight
    /// series completes its write, but no new series starts.
    fn sync_all(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        for spec in &self.specs {
            if self.cancel.is_cancelled() {
                debug!("cancellation observed, not starting further series");
                break;
            }

            let result = sync_series(self.client, spec, self.recovery);
            match &result {
                Ok(SyncOutcome::Synced(count)) => {
                    info!(series = %spec.series, count, "series advanced");
                    self.journal.debug(format!(
                        "Mirrored {} points into bucket '{}'.",
                        count, spec.series
                    ));
                }
                Ok(SyncOutcome::NoChange) => {
                    debug!(series = %spec.series, "already current");
                }
                Err(e) => {
                    warn!(series = %spec.series, error = %e, "series sync failed");
                    self.journal.error(e.to_string());
                }
            }
            report.results.push((spec.series.clone(), result));
        }

        report
    }

    /// Loop forever until the cancel flag is raised.
    pub fn run(&mut self) {
        info!(
            series = self.specs.len(),
            cooldown_secs = self.cooldown.as_secs(),
            "mirror loop started"
        );

        loop {
            if self.cancel.is_cancelled() {
                info!("mirror loop cancelled");
                return;
            }

            match self.step() {
                // Go straight from a successful probe into the sync pass.
                StepOutcome::RemoteReachable => continue,
                StepOutcome::Unreachable => self.sleep_cooldown(),
                StepOutcome::CycleComplete(report) => {
                    let failures = report.failures().len();
                    if failures > 0 {
                        warn!(failures, "cycle finished with failed series");
                    } else {
                        debug!(points = report.synced_points(), "cycle finished");
                    }
                    self.sleep_cooldown();
                }
            }
        }
    }

    /// Sleep one refresh interval in slices so cancellation lands promptly.
    fn sleep_cooldown(&self) {
        let deadline = Instant::now() + self.cooldown;
        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(COOLDOWN_SLICE.min(deadline - now));
        }
    }
}
