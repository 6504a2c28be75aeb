//! Tick sources.
//!
//! A tick source advances the timer while it runs. The service owns exactly
//! one and talks to it through [`TickSource`]; the source reports back on a
//! [`DriverEvent`] channel. Every (re)start bumps a generation number and
//! every event carries the generation it was produced under, so events from a
//! cancelled run can be told apart from the current one.

use crate::timer::TimerState;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// One second passed.
    Tick { generation: u64 },
    /// The clock should now read `seconds`, derived from wall-clock time.
    Sync { generation: u64, seconds: u64 },
    /// A countdown reached zero.
    Complete { generation: u64 },
}

impl DriverEvent {
    pub fn generation(&self) -> u64 {
        match *self {
            DriverEvent::Tick { generation }
            | DriverEvent::Sync { generation, .. }
            | DriverEvent::Complete { generation } => generation,
        }
    }
}

/// Which tick source the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Counts one-second ticks.
    Foreground,
    /// Separate task deriving time from timestamps every 100ms.
    #[default]
    Worker,
}

pub trait TickSource: Send {
    /// Begin ticking from `state`, cancelling any run in progress.
    fn start(&mut self, state: &TimerState);
    fn pause(&mut self);
    fn resume(&mut self, state: &TimerState);
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    /// Generation of the current run; events from other generations are stale.
    fn generation(&self) -> u64;
}

/// Fixed-period ticker running as a single tokio task.
pub struct TickDriver {
    events: mpsc::UnboundedSender<DriverEvent>,
    period: Duration,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl TickDriver {
    pub fn new(events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self::with_period(events, TICK_PERIOD)
    }

    pub fn with_period(events: mpsc::UnboundedSender<DriverEvent>, period: Duration) -> Self {
        Self {
            events,
            period,
            handle: None,
            generation: 0,
        }
    }

    fn spawn(&mut self) {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let period = self.period;
        let events = self.events.clone();
        debug!("Starting tick driver (generation {})", generation);
        self.handle = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if events.send(DriverEvent::Tick { generation }).is_err() {
                    break;
                }
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl TickSource for TickDriver {
    fn start(&mut self, _state: &TimerState) {
        self.spawn();
    }

    fn pause(&mut self) {
        self.cancel();
    }

    fn resume(&mut self, _state: &TimerState) {
        self.spawn();
    }

    fn stop(&mut self) {
        self.cancel();
    }

    fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.cancel();
    }
}
