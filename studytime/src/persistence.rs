//! Snapshot persistence and restore-time reconciliation.
//!
//! Every state change is mirrored to a [`SnapshotStore`] together with the
//! time it was written. On start-up the snapshot is read back once and, if
//! the clock was running, moved forward by the time that passed while
//! nothing was watching it.

use crate::error::PersistenceError;
use crate::timer::{StudySession, TimerState};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use studytime_ipc::TimerMode;
use tracing::{debug, info, warn};

pub const STORAGE_KEY: &str = "timerState";

/// The persisted record, field for field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub mode: TimerMode,
    pub minutes: i64,
    pub seconds: i64,
    pub is_running: bool,
    pub is_paused: bool,
    pub start_date_time: Option<DateTime<Utc>>,
    pub selected_alarm: String,
    pub initial_minutes: i64,
    pub initial_seconds: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub selected_subject: Option<i64>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn capture(state: &TimerState, now: DateTime<Utc>) -> Self {
        let (minutes, seconds) = split(state.remaining_or_elapsed);
        let (initial_minutes, initial_seconds) = split(state.initial_duration);
        Self {
            mode: state.mode,
            minutes,
            seconds,
            is_running: state.is_running,
            is_paused: state.is_paused,
            start_date_time: state.started_at,
            selected_alarm: state.selected_alarm.clone(),
            initial_minutes,
            initial_seconds,
            last_updated: now,
            selected_subject: state.session.subject_id,
            topic: state.session.topic.clone(),
            start_time: state.session.started_at,
        }
    }

    /// The stored state exactly as written, without any gap applied.
    /// Negative counts in a hand-edited or foreign record clamp to zero.
    pub fn to_state(&self) -> TimerState {
        let is_running = self.is_running;
        TimerState {
            mode: self.mode,
            remaining_or_elapsed: join(self.minutes, self.seconds),
            initial_duration: join(self.initial_minutes, self.initial_seconds),
            is_running,
            is_paused: is_running && self.is_paused,
            started_at: self.start_date_time,
            selected_alarm: self.selected_alarm.clone(),
            session: StudySession {
                subject_id: self.selected_subject,
                topic: self.topic.clone(),
                started_at: self.start_time,
            },
        }
    }
}

fn split(total: u64) -> (i64, i64) {
    let minutes = i64::try_from(total / 60).unwrap_or(i64::MAX);
    (minutes, (total % 60) as i64)
}

fn join(minutes: i64, seconds: i64) -> u64 {
    let minutes = u64::try_from(minutes).unwrap_or(0);
    let seconds = u64::try_from(seconds).unwrap_or(0);
    minutes.saturating_mul(60).saturating_add(seconds)
}

/// Whole seconds between `last_updated` and `now`, never negative.
///
/// A `last_updated` in the future means the wall clock moved backwards;
/// that counts as no time passing.
pub fn gap_seconds(last_updated: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (now - last_updated).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis / 1000) as u64
    }
}

/// Apply `gap` seconds of unobserved running time to a restored state.
///
/// Returns `true` when a countdown ran out during the gap. No completion is
/// reported for it: nothing was around to observe the moment it finished.
pub fn reconcile(state: &mut TimerState, gap: u64) -> bool {
    if !state.is_ticking() {
        return false;
    }
    match state.mode {
        TimerMode::Countdown => {
            state.remaining_or_elapsed = state.remaining_or_elapsed.saturating_sub(gap);
            if state.remaining_or_elapsed == 0 {
                state.is_running = false;
                state.is_paused = false;
                return true;
            }
        }
        TimerMode::Stopwatch => {
            state.remaining_or_elapsed = state.remaining_or_elapsed.saturating_add(gap);
        }
    }
    false
}

// ── Storage backends ─────────────────────────────────────────────────

/// Durable key/value storage for snapshots.
pub trait SnapshotStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory.
    pub fn in_data_dir() -> Result<Self, PersistenceError> {
        let proj_dirs = ProjectDirs::from("com", "studytime", "studytime")
            .ok_or(PersistenceError::NoDataDir)?;
        Ok(Self::new(proj_dirs.data_dir()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SnapshotStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| PersistenceError::Read { path, source })
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        fs::create_dir_all(&self.dir).map_err(|source| PersistenceError::Write {
            path: self.dir.clone(),
            source,
        })?;
        // write-then-rename so a crash mid-write never leaves half a record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|source| PersistenceError::Write { path, source })
    }
}

/// In-process store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    Defaults,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restored {
    pub state: TimerState,
    pub source: RestoreSource,
    pub gap_seconds: u64,
    /// A running countdown hit zero while no one was watching.
    pub expired_while_away: bool,
}

pub struct PersistenceBridge {
    store: Box<dyn SnapshotStore>,
    key: String,
}

impl PersistenceBridge {
    pub fn new(store: Box<dyn SnapshotStore>) -> Self {
        Self::with_key(store, STORAGE_KEY)
    }

    pub fn with_key(store: Box<dyn SnapshotStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Mirror `state` to storage. Failures are logged; the in-memory state
    /// stays authoritative.
    pub fn save(&self, state: &TimerState, now: DateTime<Utc>) {
        if let Err(e) = self.try_save(state, now) {
            warn!("Failed to persist timer state: {}", e);
        }
    }

    pub fn try_save(&self, state: &TimerState, now: DateTime<Utc>) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(&Snapshot::capture(state, now))?;
        self.store.write(&self.key, &json)
    }

    pub fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        match self.store.read(&self.key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Read the snapshot and bring it up to `now`. Anything unreadable
    /// falls back to `defaults`.
    pub fn restore(&self, defaults: TimerState, now: DateTime<Utc>) -> Restored {
        let snapshot = match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("No timer snapshot found, using defaults");
                return Restored::defaults(defaults);
            }
            Err(e) => {
                warn!("Ignoring unreadable timer snapshot: {}", e);
                return Restored::defaults(defaults);
            }
        };

        let mut state = snapshot.to_state();
        let gap = gap_seconds(snapshot.last_updated, now);
        let expired = reconcile(&mut state, gap);
        if expired {
            info!("Countdown finished {}s ago while away; restored as stopped", gap);
        } else {
            info!(
                "Restored {} at {}s (gap {}s, {:?})",
                state.mode,
                state.remaining_or_elapsed,
                gap,
                state.run_state()
            );
        }
        Restored {
            state,
            source: RestoreSource::Snapshot,
            gap_seconds: gap,
            expired_while_away: expired,
        }
    }
}

impl Restored {
    fn defaults(state: TimerState) -> Self {
        Self {
            state,
            source: RestoreSource::Defaults,
            gap_seconds: 0,
            expired_while_away: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 14, 0, 0).unwrap()
    }

    fn running_countdown(remaining: u64) -> TimerState {
        let mut state = TimerState::default();
        state.remaining_or_elapsed = remaining;
        state.is_running = true;
        state.started_at = Some(now() - Duration::minutes(10));
        state
    }

    fn bridge_with(state: &TimerState, written_at: DateTime<Utc>) -> PersistenceBridge {
        let bridge = PersistenceBridge::new(Box::new(MemoryStore::new()));
        bridge.save(state, written_at);
        bridge
    }

    struct BrokenStore;

    impl SnapshotStore for BrokenStore {
        fn read(&self, _key: &str) -> Result<Option<String>, PersistenceError> {
            Err(PersistenceError::Unavailable("disk gone".into()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::Unavailable("disk gone".into()))
        }
    }

    #[test]
    fn running_countdown_loses_the_gap() {
        let bridge = bridge_with(&running_countdown(100), now() - Duration::seconds(30));
        let restored = bridge.restore(TimerState::default(), now());
        assert_eq!(restored.source, RestoreSource::Snapshot);
        assert_eq!(restored.gap_seconds, 30);
        assert_eq!(restored.state.remaining_or_elapsed, 70);
        assert!(restored.state.is_running);
        assert!(!restored.expired_while_away);
    }

    #[test]
    fn countdown_that_ran_out_while_away_stops_at_zero() {
        let bridge = bridge_with(&running_countdown(100), now() - Duration::seconds(150));
        let restored = bridge.restore(TimerState::default(), now());
        assert_eq!(restored.state.remaining_or_elapsed, 0);
        assert!(!restored.state.is_running);
        assert!(!restored.state.is_paused);
        assert!(restored.expired_while_away);
    }

    #[test]
    fn paused_state_ignores_the_gap() {
        let mut state = running_countdown(100);
        state.is_paused = true;
        let bridge = bridge_with(&state, now() - Duration::hours(6));
        let restored = bridge.restore(TimerState::default(), now());
        assert_eq!(restored.state, state);
    }

    #[test]
    fn stopped_state_ignores_the_gap() {
        let mut state = TimerState::default();
        state.remaining_or_elapsed = 321;
        let bridge = bridge_with(&state, now() - Duration::minutes(45));
        let restored = bridge.restore(TimerState::default(), now());
        assert_eq!(restored.state.remaining_or_elapsed, 321);
        assert!(!restored.state.is_running);
    }

    #[test]
    fn running_stopwatch_gains_the_gap() {
        let mut state = TimerState::default();
        state.mode = TimerMode::Stopwatch;
        state.remaining_or_elapsed = 40;
        state.is_running = true;
        let bridge = bridge_with(&state, now() - Duration::milliseconds(12_999));
        let restored = bridge.restore(TimerState::default(), now());
        assert_eq!(restored.state.remaining_or_elapsed, 52);
        assert!(restored.state.is_running);
    }

    #[test]
    fn future_timestamp_clamps_gap_to_zero() {
        assert_eq!(gap_seconds(now() + Duration::seconds(10), now()), 0);
        let bridge = bridge_with(&running_countdown(100), now() + Duration::seconds(10));
        let restored = bridge.restore(TimerState::default(), now());
        assert_eq!(restored.gap_seconds, 0);
        assert_eq!(restored.state.remaining_or_elapsed, 100);
    }

    #[test]
    fn metadata_is_restored_verbatim() {
        let mut state = running_countdown(600);
        state.mode = TimerMode::Countdown;
        state.initial_duration = 50 * 60;
        state.selected_alarm = "gong".into();
        state.session = StudySession {
            subject_id: Some(12),
            topic: "Organic chemistry".into(),
            started_at: Some(now() - Duration::minutes(40)),
        };
        let bridge = bridge_with(&state, now() - Duration::seconds(5));
        let restored = bridge.restore(TimerState::default(), now());
        assert_eq!(restored.state.initial_duration, 50 * 60);
        assert_eq!(restored.state.selected_alarm, "gong");
        assert_eq!(restored.state.session, state.session);
        assert_eq!(restored.state.started_at, state.started_at);
    }

    #[test]
    fn missing_or_malformed_snapshot_falls_back_to_defaults() {
        let empty = PersistenceBridge::new(Box::new(MemoryStore::new()));
        let restored = empty.restore(TimerState::new(900, "bell"), now());
        assert_eq!(restored.source, RestoreSource::Defaults);
        assert_eq!(restored.state.remaining_or_elapsed, 900);

        let store = MemoryStore::new();
        store.write(STORAGE_KEY, "{\"mode\":\"timer\",\"minutes\":").unwrap();
        let garbled = PersistenceBridge::new(Box::new(store));
        assert!(garbled.load().is_err());
        let restored = garbled.restore(TimerState::default(), now());
        assert_eq!(restored.source, RestoreSource::Defaults);

        let unreadable = PersistenceBridge::new(Box::new(BrokenStore));
        let restored = unreadable.restore(TimerState::default(), now());
        assert_eq!(restored.source, RestoreSource::Defaults);
    }

    #[test]
    fn write_failures_are_swallowed() {
        let bridge = PersistenceBridge::new(Box::new(BrokenStore));
        bridge.save(&TimerState::default(), now());
        assert!(bridge.try_save(&TimerState::default(), now()).is_err());
    }

    #[test]
    fn record_uses_storage_field_names() {
        let mut state = running_countdown(25 * 60 + 7);
        state.session.subject_id = Some(3);
        let value = serde_json::to_value(Snapshot::capture(&state, now())).unwrap();
        assert_eq!(value["mode"], "timer");
        assert_eq!(value["minutes"], 25);
        assert_eq!(value["seconds"], 7);
        assert_eq!(value["isRunning"], true);
        assert_eq!(value["initialMinutes"], 25);
        assert_eq!(value["initialSeconds"], 0);
        assert_eq!(value["selectedSubject"], 3);
        assert_eq!(value["lastUpdated"], now().timestamp_millis());
        assert!(value["startTime"].is_null());
    }

    #[test]
    fn foreign_record_with_negative_counts_is_clamped() {
        let json = r#"{
            "mode": "stopwatch",
            "minutes": -3, "seconds": 20,
            "isRunning": false, "isPaused": true,
            "startDateTime": null,
            "selectedAlarm": "bell",
            "initialMinutes": -1, "initialSeconds": -1,
            "lastUpdated": 1725285600000
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let state = snapshot.to_state();
        assert_eq!(state.mode, TimerMode::Stopwatch);
        assert_eq!(state.remaining_or_elapsed, 20);
        assert_eq!(state.initial_duration, 0);
        assert!(!state.is_paused, "paused requires running");
        assert_eq!(state.session, StudySession::default());
    }

    #[test]
    fn file_store_keeps_one_file_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.read(STORAGE_KEY).unwrap(), None);

        let bridge = PersistenceBridge::new(Box::new(store.clone()));
        let state = running_countdown(500);
        bridge.save(&state, now());
        assert!(dir.path().join("nested").join("timerState.json").exists());

        let restored = bridge.restore(TimerState::default(), now());
        assert_eq!(restored.state, state);
    }
}
