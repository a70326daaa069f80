/*!
 * Integration tests for the mirror loop
 *
 * Tests cover:
 * - Probing/Syncing state machine transitions
 * - Cooldown-without-backoff behavior on an unreachable remote
 * - Per-series failure isolation inside a cycle
 * - Journal policy (failures journaled, unreachable probes not)
 * - Cancellation at the loop's suspension points
 */

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tidemark::core::{CancelFlag, MirrorLoop, MirrorState, StepOutcome};
use tidemark::store::{DataPoint, FieldValue, StoreClient, StoreError, StoreTarget};
use tidemark::{MirrorConfig, JOURNAL_BUCKET};

/// Scripted store client: switchable reachability, per-series data and
/// failure injection, call counters.
#[derive(Default)]
struct ScriptedStore {
    reachable: RefCell<bool>,
    source: RefCell<HashMap<String, Vec<DataPoint>>>,
    dest: RefCell<HashMap<String, Vec<DataPoint>>>,
    fail_series: RefCell<Vec<String>>,
    ping_calls: RefCell<usize>,
    sync_queries: RefCell<usize>,
    journal_writes: RefCell<Vec<DataPoint>>,
}

impl ScriptedStore {
    fn reachable() -> Self {
        let store = Self::default();
        *store.reachable.borrow_mut() = true;
        store
    }

    fn with_source(self, series: &str, points: Vec<DataPoint>) -> Self {
        self.source.borrow_mut().insert(series.to_string(), points);
        self
    }

    fn failing(self, series: &str) -> Self {
        self.fail_series.borrow_mut().push(series.to_string());
        self
    }

    fn dest_latest(&self, series: &str) -> Option<DateTime<Utc>> {
        self.dest
            .borrow()
            .get(series)
            .and_then(|ps| ps.iter().map(|p| p.time).max())
    }
}

impl StoreClient for ScriptedStore {
    fn ping(&self, _target: &StoreTarget) -> bool {
        *self.ping_calls.borrow_mut() += 1;
        *self.reachable.borrow()
    }

    fn latest_timestamp(
        &self,
        _target: &StoreTarget,
        series: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.dest_latest(series))
    }

    fn query_after(
        &self,
        _target: &StoreTarget,
        series: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, StoreError> {
        *self.sync_queries.borrow_mut() += 1;
        Ok(self
            .source
            .borrow()
            .get(series)
            .map(|ps| ps.iter().filter(|p| p.time > since).cloned().collect())
            .unwrap_or_default())
    }

    fn write(
        &self,
        _target: &StoreTarget,
        series: &str,
        points: &[DataPoint],
    ) -> Result<(), StoreError> {
        if series == JOURNAL_BUCKET {
            self.journal_writes
                .borrow_mut()
                .extend(points.iter().cloned());
            return Ok(());
        }
        if self.fail_series.borrow().iter().any(|s| s == series) {
            return Err(StoreError::Transport("connection reset by peer".to_string()));
        }
        self.dest
            .borrow_mut()
            .entry(series.to_string())
            .or_default()
            .extend(points.iter().cloned());
        Ok(())
    }
}

fn config(buckets: &[&str], interval: &str) -> MirrorConfig {
    let bucket_list = buckets
        .iter()
        .map(|b| format!("\"{}\"", b))
        .collect::<Vec<_>>()
        .join(", ");
    toml::from_str(&format!(
        r#"
refresh_interval = "{interval}"
recovery_timestamp = "2023-01-01T00:00:00Z"
buckets = [{bucket_list}]

[remote]
url = "http://198.51.100.7:8086"
org = "plant"
token = "t"

[local]
url = "http://127.0.0.1:8086"
org = "edge"
token = "t"
"#
    ))
    .unwrap()
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, hour, 0, 0).unwrap()
}

fn point(hour: u32) -> DataPoint {
    DataPoint::new("m", at(hour)).field("v", FieldValue::Float(hour as f64))
}

// =============================================================================
// Probing behavior
// =============================================================================

#[test]
fn test_three_failed_probes_stay_probing_with_no_side_effects() {
    let store = ScriptedStore::default();
    let config = config(&["sensors"], "00:00:01");
    let mut mirror = MirrorLoop::new(&store, &config, CancelFlag::new()).unwrap();

    for _ in 0..3 {
        assert!(matches!(mirror.step(), StepOutcome::Unreachable));
        assert_eq!(mirror.state(), MirrorState::Probing);
    }

    assert_eq!(*store.ping_calls.borrow(), 3);
    // No sync engine invocations and no journal writes: unreachable is the
    // expected state of the link, not an error.
    assert_eq!(*store.sync_queries.borrow(), 0);
    assert!(store.journal_writes.borrow().is_empty());
}

#[test]
fn test_probe_recovers_when_remote_comes_back() {
    let store = ScriptedStore::default().with_source("sensors", vec![point(1)]);
    let config = config(&["sensors"], "00:00:01");
    let mut mirror = MirrorLoop::new(&store, &config, CancelFlag::new()).unwrap();

    assert!(matches!(mirror.step(), StepOutcome::Unreachable));

    *store.reachable.borrow_mut() = true;
    assert!(matches!(mirror.step(), StepOutcome::RemoteReachable));
    assert_eq!(mirror.state(), MirrorState::Syncing);

    match mirror.step() {
        StepOutcome::CycleComplete(report) => assert_eq!(report.synced_points(), 1),
        other => panic!("Expected CycleComplete, got {:?}", other),
    }
}

// =============================================================================
// Sync cycle behavior
// =============================================================================

#[test]
fn test_full_cycle_advances_all_series() {
    let store = ScriptedStore::reachable()
        .with_source("sensors", vec![point(1), point(2)])
        .with_source("machines", vec![point(3)]);
    let config = config(&["sensors", "machines"], "00:00:01");
    let mut mirror = MirrorLoop::new(&store, &config, CancelFlag::new()).unwrap();

    assert!(matches!(mirror.step(), StepOutcome::RemoteReachable));
    let report = match mirror.step() {
        StepOutcome::CycleComplete(report) => report,
        other => panic!("Expected CycleComplete, got {:?}", other),
    };

    assert_eq!(report.synced_points(), 3);
    assert!(report.failures().is_empty());
    assert_eq!(store.dest_latest("sensors"), Some(at(2)));
    assert_eq!(store.dest_latest("machines"), Some(at(3)));
    assert_eq!(mirror.state(), MirrorState::Probing);
}

#[test]
fn test_failed_series_is_isolated_and_journaled() {
    let store = ScriptedStore::reachable()
        .with_source("alpha", vec![point(1)])
        .with_source("beta", vec![point(1), point(2)])
        .failing("alpha");
    let config = config(&["alpha", "beta"], "00:00:01");
    let mut mirror = MirrorLoop::new(&store, &config, CancelFlag::new()).unwrap();

    mirror.step();
    let report = match mirror.step() {
        StepOutcome::CycleComplete(report) => report,
        other => panic!("Expected CycleComplete, got {:?}", other),
    };

    // alpha's write failure did not stop beta's watermark from advancing
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].series, "alpha");
    assert_eq!(store.dest_latest("beta"), Some(at(2)));

    // The failure reached the journal as an ERROR record
    let journal = store.journal_writes.borrow();
    let error_records: Vec<_> = journal
        .iter()
        .filter(|p| p.tags.get("LOG_LEVEL").map(String::as_str) == Some("ERROR"))
        .collect();
    assert_eq!(error_records.len(), 1);
    match &error_records[0].fields["Message"] {
        FieldValue::Text(msg) => assert!(msg.contains("alpha")),
        other => panic!("Expected text message field, got {:?}", other),
    }
}

#[test]
fn test_second_cycle_after_no_change_is_quiet() {
    let store = ScriptedStore::reachable().with_source("sensors", vec![point(1)]);
    let config = config(&["sensors"], "00:00:01");
    let mut mirror = MirrorLoop::new(&store, &config, CancelFlag::new()).unwrap();

    mirror.step();
    mirror.step();

    // Second cycle: source unchanged, so nothing is fetched or written.
    mirror.step();
    let report = match mirror.step() {
        StepOutcome::CycleComplete(report) => report,
        other => panic!("Expected CycleComplete, got {:?}", other),
    };
    assert_eq!(report.synced_points(), 0);
    assert!(report.failures().is_empty());
    assert_eq!(store.dest.borrow()["sensors"].len(), 1);
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_cancellation_between_series() {
    let store = ScriptedStore::reachable()
        .with_source("alpha", vec![point(1)])
        .with_source("beta", vec![point(1)]);
    let config = config(&["alpha", "beta"], "00:00:01");
    let cancel = CancelFlag::new();
    let mut mirror = MirrorLoop::new(&store, &config, cancel.clone()).unwrap();

    mirror.step();
    cancel.cancel();
    let report = match mirror.step() {
        StepOutcome::CycleComplete(report) => report,
        other => panic!("Expected CycleComplete, got {:?}", other),
    };

    // No new series started after the signal
    assert!(report.results.is_empty());
    assert_eq!(store.dest_latest("alpha"), None);
}

#[test]
fn test_run_exits_promptly_when_cancelled_mid_cooldown() {
    let store = ScriptedStore::default();
    let config = config(&["sensors"], "00:00:30");
    let cancel = CancelFlag::new();
    let mut mirror = MirrorLoop::new(&store, &config, cancel.clone()).unwrap();

    let canceller = std::thread::spawn({
        let cancel = cancel.clone();
        move || {
            std::thread::sleep(Duration::from_millis(400));
            cancel.cancel();
        }
    });

    // The remote is unreachable, so run() enters a 30-second cooldown; the
    // sliced sleep must notice the flag long before the interval elapses.
    let started = Instant::now();
    mirror.run();
    let elapsed = started.elapsed();

    canceller.join().unwrap();
    assert!(*store.ping_calls.borrow() >= 1);
    assert!(
        elapsed < Duration::from_secs(5),
        "cancellation took {:?}",
        elapsed
    );
}
