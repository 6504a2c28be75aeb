//! Timer state store.
//!
//! The store is the single source of truth for the countdown/stopwatch. It is
//! constructed empty, loaded once with [`TimerStore::initialize`], and then
//! mutated only through its commands. Commands never fail on a loaded store:
//! a command that does not apply to the current state is a no-op and reports
//! `Ok(false)`.
//!
//! ```text
//! Idle -> Running -> (Paused <-> Running) -> Idle
//! ```

use crate::clock::Clock;
use crate::error::{Result, TimerError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use studytime_ipc::{TimerMode, TimerState as RunState, TimerStatus};

pub const DEFAULT_DURATION_SECS: u64 = 25 * 60;
pub const DEFAULT_ALARM: &str = "bell";

/// What is being studied while the clock runs. Persisted with the timer,
/// but only consumed when a finished session is saved elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudySession {
    pub subject_id: Option<i64>,
    pub topic: String,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerState {
    pub mode: TimerMode,
    /// Remaining seconds (countdown) or elapsed seconds (stopwatch).
    pub remaining_or_elapsed: u64,
    /// Configured countdown length in seconds.
    pub initial_duration: u64,
    pub is_running: bool,
    /// Only meaningful while `is_running`.
    pub is_paused: bool,
    /// When the current run began. Survives pause/resume, cleared by reset.
    pub started_at: Option<DateTime<Utc>>,
    pub selected_alarm: String,
    pub session: StudySession,
}

impl TimerState {
    pub fn new(initial_duration: u64, alarm: impl Into<String>) -> Self {
        Self {
            mode: TimerMode::Countdown,
            remaining_or_elapsed: initial_duration,
            initial_duration,
            is_running: false,
            is_paused: false,
            started_at: None,
            selected_alarm: alarm.into(),
            session: StudySession::default(),
        }
    }

    /// True when ticks should advance the clock.
    pub fn is_ticking(&self) -> bool {
        self.is_running && !self.is_paused
    }

    pub fn run_state(&self) -> RunState {
        RunState::from_flags(self.is_running, self.is_paused)
    }

    fn reset_value(&self) -> u64 {
        match self.mode {
            TimerMode::Countdown => self.initial_duration,
            TimerMode::Stopwatch => 0,
        }
    }

    fn stop(&mut self) {
        self.is_running = false;
        self.is_paused = false;
    }

    pub fn status(&self) -> TimerStatus {
        TimerStatus {
            mode: self.mode,
            state: self.run_state(),
            seconds: self.remaining_or_elapsed,
            initial_seconds: self.initial_duration,
            started_at: self.started_at,
            alarm: self.selected_alarm.clone(),
            subject_id: self.session.subject_id,
            topic: self.session.topic.clone(),
            session_start: self.session.started_at,
        }
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION_SECS, DEFAULT_ALARM)
    }
}

/// Result of applying one tick to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The store was not ticking; nothing changed.
    Ignored,
    Advanced,
    /// The countdown reached zero on this tick and the clock stopped.
    Completed,
}

pub struct TimerStore {
    clock: Arc<dyn Clock>,
    state: Option<TimerState>,
}

impl TimerStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, state: None }
    }

    /// Load the state the store starts from. Replaces any previous state.
    pub fn initialize(&mut self, state: TimerState) {
        self.state = Some(state);
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&TimerState> {
        self.state.as_ref()
    }

    pub fn status(&self) -> Option<TimerStatus> {
        self.state.as_ref().map(TimerState::status)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn state_mut(&mut self) -> Result<&mut TimerState> {
        self.state
            .as_mut()
            .ok_or(TimerError::InvalidState("timer store is not initialized"))
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<bool> {
        let now = self.clock.now();
        let state = self.state_mut()?;
        if state.is_running {
            if state.is_paused {
                state.is_paused = false;
                return Ok(true);
            }
            return Ok(false);
        }
        if state.mode == TimerMode::Countdown && state.remaining_or_elapsed == 0 {
            // Finished countdown: start over from the configured length.
            if state.initial_duration == 0 {
                return Ok(false);
            }
            state.remaining_or_elapsed = state.initial_duration;
        }
        state.is_running = true;
        state.is_paused = false;
        if state.started_at.is_none() {
            state.started_at = Some(now);
        }
        Ok(true)
    }

    pub fn pause(&mut self) -> Result<bool> {
        let state = self.state_mut()?;
        if !state.is_ticking() {
            return Ok(false);
        }
        state.is_paused = true;
        Ok(true)
    }

    pub fn resume(&mut self) -> Result<bool> {
        let state = self.state_mut()?;
        if !(state.is_running && state.is_paused) {
            return Ok(false);
        }
        state.is_paused = false;
        Ok(true)
    }

    pub fn reset(&mut self) -> Result<bool> {
        let state = self.state_mut()?;
        state.stop();
        state.started_at = None;
        state.remaining_or_elapsed = state.reset_value();
        Ok(true)
    }

    /// Switch modes. Always resets under the new mode's rules.
    pub fn set_mode(&mut self, mode: TimerMode) -> Result<bool> {
        self.state_mut()?.mode = mode;
        self.reset()
    }

    /// Configure the countdown length. Seconds past 59 carry into minutes.
    ///
    /// In stopwatch mode only the stored length changes; the elapsed time is
    /// left alone so switching back to countdown picks the new length up.
    pub fn set_duration(&mut self, minutes: u64, seconds: u64) -> Result<bool> {
        let state = self.state_mut()?;
        let total = minutes.saturating_mul(60).saturating_add(seconds);
        state.initial_duration = total;
        if state.mode == TimerMode::Countdown {
            state.remaining_or_elapsed = total;
            if total == 0 {
                state.stop();
            }
        }
        Ok(true)
    }

    pub fn set_alarm(&mut self, id: impl Into<String>) -> Result<bool> {
        let id = id.into();
        let state = self.state_mut()?;
        if state.selected_alarm == id {
            return Ok(false);
        }
        state.selected_alarm = id;
        Ok(true)
    }

    pub fn set_subject(&mut self, subject_id: Option<i64>) -> Result<bool> {
        let state = self.state_mut()?;
        if state.session.subject_id == subject_id {
            return Ok(false);
        }
        state.session.subject_id = subject_id;
        Ok(true)
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) -> Result<bool> {
        let topic = topic.into();
        let state = self.state_mut()?;
        if state.session.topic == topic {
            return Ok(false);
        }
        state.session.topic = topic;
        Ok(true)
    }

    pub fn set_session_start(&mut self, at: Option<DateTime<Utc>>) -> Result<bool> {
        let state = self.state_mut()?;
        if state.session.started_at == at {
            return Ok(false);
        }
        state.session.started_at = at;
        Ok(true)
    }

    // ── Ticks ────────────────────────────────────────────────────────

    /// Advance the clock by one second.
    ///
    /// Running/paused flags are checked here, at apply time, so a tick
    /// queued before a pause or reset is dropped.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        let state = self.state_mut()?;
        if !state.is_ticking() {
            return Ok(TickOutcome::Ignored);
        }
        match state.mode {
            TimerMode::Countdown => {
                state.remaining_or_elapsed = state.remaining_or_elapsed.saturating_sub(1);
                if state.remaining_or_elapsed == 0 {
                    state.stop();
                    return Ok(TickOutcome::Completed);
                }
            }
            TimerMode::Stopwatch => {
                state.remaining_or_elapsed = state.remaining_or_elapsed.saturating_add(1);
            }
        }
        Ok(TickOutcome::Advanced)
    }

    /// Set the clock to a value derived from wall-clock time by the worker.
    pub fn sync(&mut self, seconds: u64) -> Result<TickOutcome> {
        let state = self.state_mut()?;
        if !state.is_ticking() {
            return Ok(TickOutcome::Ignored);
        }
        state.remaining_or_elapsed = seconds;
        if state.mode == TimerMode::Countdown && seconds == 0 {
            state.stop();
            return Ok(TickOutcome::Completed);
        }
        Ok(TickOutcome::Advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    fn store() -> (TimerStore, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 6, 8, 30, 0).unwrap());
        let mut store = TimerStore::new(Arc::new(clock.clone()));
        store.initialize(TimerState::default());
        (store, clock)
    }

    fn value(store: &TimerStore) -> u64 {
        store.state().unwrap().remaining_or_elapsed
    }

    #[test]
    fn uninitialized_store_rejects_commands() {
        let mut store = TimerStore::new(Arc::new(crate::clock::SystemClock));
        assert!(!store.is_initialized());
        assert_eq!(
            store.start(),
            Err(TimerError::InvalidState("timer store is not initialized"))
        );
        assert!(store.tick().is_err());
        assert!(store.status().is_none());
    }

    #[test]
    fn defaults_to_twenty_five_minute_countdown() {
        let (store, _) = store();
        let state = store.state().unwrap();
        assert_eq!(state.mode, TimerMode::Countdown);
        assert_eq!(state.remaining_or_elapsed, 25 * 60);
        assert!(!state.is_running);
        assert!(state.started_at.is_none());
    }

    #[test]
    fn start_pause_resume() {
        let (mut store, _) = store();
        assert_eq!(store.start(), Ok(true));
        assert_eq!(store.state().unwrap().run_state(), RunState::Running);
        assert_eq!(store.start(), Ok(false));

        assert_eq!(store.pause(), Ok(true));
        assert_eq!(store.state().unwrap().run_state(), RunState::Paused);
        assert_eq!(store.pause(), Ok(false));

        assert_eq!(store.resume(), Ok(true));
        assert_eq!(store.resume(), Ok(false));
        assert_eq!(store.state().unwrap().run_state(), RunState::Running);
    }

    #[test]
    fn pause_and_resume_are_noops_when_stopped() {
        let (mut store, _) = store();
        assert_eq!(store.pause(), Ok(false));
        assert_eq!(store.resume(), Ok(false));
        let state = store.state().unwrap();
        assert!(!state.is_paused);
        assert!(!state.is_running);
    }

    #[test]
    fn start_while_paused_resumes() {
        let (mut store, _) = store();
        store.start().unwrap();
        store.pause().unwrap();
        assert_eq!(store.start(), Ok(true));
        assert!(store.state().unwrap().is_ticking());
    }

    #[test]
    fn start_then_pause_keeps_value() {
        let (mut store, _) = store();
        store.start().unwrap();
        store.pause().unwrap();
        assert_eq!(value(&store), 25 * 60);
    }

    #[test]
    fn set_duration_then_reset_restores_it() {
        for (minutes, seconds) in [(0, 1), (5, 0), (25, 0), (90, 59), (1, 30)] {
            let (mut store, _) = store();
            store.set_duration(minutes, seconds).unwrap();
            store.start().unwrap();
            for _ in 0..3 {
                store.tick().unwrap();
            }
            store.reset().unwrap();
            assert_eq!(value(&store), minutes * 60 + seconds);
        }
    }

    #[test]
    fn set_duration_keeps_running_flag() {
        let (mut store, _) = store();
        store.start().unwrap();
        store.set_duration(10, 0).unwrap();
        let state = store.state().unwrap();
        assert!(state.is_running);
        assert_eq!(state.remaining_or_elapsed, 600);
        assert_eq!(state.initial_duration, 600);
    }

    #[test]
    fn countdown_ticks_down_and_completes_once() {
        let (mut store, _) = store();
        store.set_duration(0, 3).unwrap();
        store.start().unwrap();

        let outcomes: Vec<_> = (0..5).map(|_| store.tick().unwrap()).collect();
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Advanced,
                TickOutcome::Advanced,
                TickOutcome::Completed,
                TickOutcome::Ignored,
                TickOutcome::Ignored,
            ]
        );
        let state = store.state().unwrap();
        assert_eq!(state.remaining_or_elapsed, 0);
        assert!(!state.is_running);
    }

    #[test]
    fn stopwatch_counts_up_without_bound() {
        let (mut store, _) = store();
        store.set_mode(TimerMode::Stopwatch).unwrap();
        assert_eq!(value(&store), 0);
        store.start().unwrap();
        for _ in 0..7200 {
            assert_eq!(store.tick().unwrap(), TickOutcome::Advanced);
        }
        assert_eq!(value(&store), 7200);
    }

    #[test]
    fn ticks_after_pause_or_reset_are_ignored() {
        let (mut store, _) = store();
        store.start().unwrap();
        store.pause().unwrap();
        assert_eq!(store.tick().unwrap(), TickOutcome::Ignored);
        assert_eq!(store.sync(10).unwrap(), TickOutcome::Ignored);
        store.reset().unwrap();
        assert_eq!(store.tick().unwrap(), TickOutcome::Ignored);
        assert_eq!(value(&store), 25 * 60);
    }

    #[test]
    fn mode_switch_resets() {
        let (mut store, _) = store();
        store.set_duration(45, 0).unwrap();
        store.start().unwrap();
        store.tick().unwrap();

        store.set_mode(TimerMode::Stopwatch).unwrap();
        let state = store.state().unwrap();
        assert_eq!(state.remaining_or_elapsed, 0);
        assert!(!state.is_running);
        assert!(state.started_at.is_none());

        store.set_mode(TimerMode::Countdown).unwrap();
        assert_eq!(value(&store), 45 * 60);
    }

    #[test]
    fn stopwatch_set_duration_only_changes_length() {
        let (mut store, _) = store();
        store.set_mode(TimerMode::Stopwatch).unwrap();
        store.start().unwrap();
        store.tick().unwrap();
        store.set_duration(15, 0).unwrap();
        assert_eq!(value(&store), 1);
        assert_eq!(store.state().unwrap().initial_duration, 900);
    }

    #[test]
    fn reset_then_start_takes_a_fresh_start_time() {
        let (mut store, clock) = store();
        store.start().unwrap();
        let first = store.state().unwrap().started_at;
        assert!(first.is_some());

        clock.advance(Duration::seconds(5));
        store.pause().unwrap();
        store.resume().unwrap();
        assert_eq!(store.state().unwrap().started_at, first);

        store.pause().unwrap();
        store.reset().unwrap();
        assert!(store.state().unwrap().started_at.is_none());

        clock.advance(Duration::seconds(5));
        store.start().unwrap();
        let second = store.state().unwrap().started_at;
        assert!(second.is_some());
        assert_ne!(second, first);
    }

    #[test]
    fn finished_countdown_restarts_from_configured_length() {
        let (mut store, _) = store();
        store.set_duration(0, 1).unwrap();
        store.start().unwrap();
        assert_eq!(store.tick().unwrap(), TickOutcome::Completed);
        assert_eq!(store.start(), Ok(true));
        assert_eq!(value(&store), 1);

        store.set_duration(0, 0).unwrap();
        assert!(!store.state().unwrap().is_running);
        assert_eq!(store.start(), Ok(false));
    }

    #[test]
    fn sync_sets_value_and_completes_at_zero() {
        let (mut store, _) = store();
        store.start().unwrap();
        assert_eq!(store.sync(1490).unwrap(), TickOutcome::Advanced);
        assert_eq!(value(&store), 1490);
        assert_eq!(store.sync(0).unwrap(), TickOutcome::Completed);
        assert!(!store.state().unwrap().is_running);
    }

    #[test]
    fn metadata_does_not_touch_the_clock() {
        let (mut store, clock) = store();
        store.start().unwrap();
        assert_eq!(store.set_alarm("chime"), Ok(true));
        assert_eq!(store.set_alarm("chime"), Ok(false));
        assert_eq!(store.set_subject(Some(4)), Ok(true));
        assert_eq!(store.set_topic("Linear algebra"), Ok(true));
        assert_eq!(store.set_session_start(Some(clock.now())), Ok(true));

        let status = store.status().unwrap();
        assert_eq!(status.state, RunState::Running);
        assert_eq!(status.alarm, "chime");
        assert_eq!(status.subject_id, Some(4));
        assert_eq!(status.topic, "Linear algebra");
        assert_eq!(status.session_start, Some(clock.now()));
    }
}
