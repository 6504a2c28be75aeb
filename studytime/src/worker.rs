//! Background timing worker.
//!
//! The worker runs in its own task and only talks through messages:
//! [`WorkerCommand`]s in, [`WorkerEvent`]s out. It wakes every 100ms but
//! never counts wake-ups. Each wake-up recomputes the clock from the instant
//! the run started, so late or skipped wake-ups cannot make it run slow.

use crate::driver::{DriverEvent, TickSource};
use crate::timer::TimerState;
use std::time::Duration;
use studytime_ipc::TimerMode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

pub const RESOLUTION: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    /// Start a fresh run from `seconds`. Negative values count as zero.
    Start {
        generation: u64,
        mode: TimerMode,
        seconds: i64,
    },
    /// Continue a paused run, keeping the time already accumulated.
    Resume { generation: u64 },
    Pause,
    Reset,
    GetState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The whole-second reading changed.
    Tick { generation: u64, seconds: u64 },
    State(WorkerSnapshot),
    TimerComplete { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub phase: WorkerPhase,
    pub mode: TimerMode,
    pub seconds: u64,
    pub generation: u64,
}

/// The worker's run state, independent of the task driving it.
#[derive(Debug)]
struct RunClock {
    phase: WorkerPhase,
    mode: TimerMode,
    base: u64,
    accumulated: Duration,
    started: Option<Instant>,
    generation: u64,
    last_reported: Option<u64>,
}

impl RunClock {
    fn new() -> Self {
        Self {
            phase: WorkerPhase::Idle,
            mode: TimerMode::Countdown,
            base: 0,
            accumulated: Duration::ZERO,
            started: None,
            generation: 0,
            last_reported: None,
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        self.accumulated + running
    }

    fn reading(&self, now: Instant) -> u64 {
        let secs = self.elapsed(now).as_secs();
        match self.mode {
            TimerMode::Countdown => self.base.saturating_sub(secs),
            TimerMode::Stopwatch => self.base.saturating_add(secs),
        }
    }

    fn start(&mut self, generation: u64, mode: TimerMode, seconds: i64, now: Instant) {
        self.phase = WorkerPhase::Running;
        self.mode = mode;
        self.base = u64::try_from(seconds).unwrap_or(0);
        self.accumulated = Duration::ZERO;
        self.started = Some(now);
        self.generation = generation;
        self.last_reported = Some(self.base);
    }

    fn pause(&mut self, now: Instant) {
        if self.phase != WorkerPhase::Running {
            return;
        }
        self.accumulated = self.elapsed(now);
        self.started = None;
        self.phase = WorkerPhase::Paused;
    }

    fn resume(&mut self, generation: u64, now: Instant) {
        if self.phase != WorkerPhase::Paused {
            return;
        }
        self.started = Some(now);
        self.phase = WorkerPhase::Running;
        self.generation = generation;
    }

    fn reset(&mut self) {
        let generation = self.generation;
        *self = Self::new();
        self.generation = generation;
    }

    fn snapshot(&self, now: Instant) -> WorkerSnapshot {
        WorkerSnapshot {
            phase: self.phase,
            mode: self.mode,
            seconds: self.reading(now),
            generation: self.generation,
        }
    }

    /// Recompute the reading and report what changed since the last poll.
    fn poll(&mut self, now: Instant) -> Option<WorkerEvent> {
        if self.phase != WorkerPhase::Running {
            return None;
        }
        let seconds = self.reading(now);
        if self.mode == TimerMode::Countdown && seconds == 0 {
            self.accumulated = self.elapsed(now);
            self.started = None;
            self.phase = WorkerPhase::Idle;
            self.last_reported = Some(0);
            return Some(WorkerEvent::TimerComplete {
                generation: self.generation,
            });
        }
        if self.last_reported == Some(seconds) {
            return None;
        }
        self.last_reported = Some(seconds);
        Some(WorkerEvent::Tick {
            generation: self.generation,
            seconds,
        })
    }
}

/// Handle to a spawned worker task.
pub struct WorkerHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn send(&self, command: WorkerCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn spawn_worker(events: mpsc::UnboundedSender<WorkerEvent>) -> WorkerHandle {
    let (commands, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(rx, events));
    WorkerHandle { commands, task }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut clock = RunClock::new();
    let mut interval = time::interval(RESOLUTION);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                let Some(command) = command else { break };
                let now = Instant::now();
                trace!("Worker received {:?}", command);
                match command {
                    WorkerCommand::Start { generation, mode, seconds } => {
                        clock.start(generation, mode, seconds, now);
                        interval.reset();
                    }
                    WorkerCommand::Resume { generation } => {
                        clock.resume(generation, now);
                        interval.reset();
                    }
                    WorkerCommand::Pause => clock.pause(now),
                    WorkerCommand::Reset => clock.reset(),
                    WorkerCommand::GetState => {
                        if events.send(WorkerEvent::State(clock.snapshot(now))).is_err() {
                            break;
                        }
                    }
                }
            }
            _ = interval.tick(), if clock.phase == WorkerPhase::Running => {
                if let Some(event) = clock.poll(Instant::now()) {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("Timing worker stopped");
}

/// [`TickSource`] backed by the worker task.
pub struct WorkerDriver {
    worker: WorkerHandle,
    forwarder: JoinHandle<()>,
    generation: u64,
    active: bool,
}

impl WorkerDriver {
    pub fn spawn(events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = spawn_worker(tx);
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let forwarded = match event {
                    WorkerEvent::Tick {
                        generation,
                        seconds,
                    } => DriverEvent::Sync {
                        generation,
                        seconds,
                    },
                    WorkerEvent::TimerComplete { generation } => {
                        DriverEvent::Complete { generation }
                    }
                    WorkerEvent::State(snapshot) => {
                        debug!("Worker state: {:?}", snapshot);
                        continue;
                    }
                };
                if events.send(forwarded).is_err() {
                    break;
                }
            }
        });
        Self {
            worker,
            forwarder,
            generation: 0,
            active: false,
        }
    }
}

impl TickSource for WorkerDriver {
    fn start(&mut self, state: &TimerState) {
        self.generation += 1;
        let seconds = i64::try_from(state.remaining_or_elapsed).unwrap_or(i64::MAX);
        self.active = self.worker.send(WorkerCommand::Start {
            generation: self.generation,
            mode: state.mode,
            seconds,
        });
    }

    fn pause(&mut self) {
        self.worker.send(WorkerCommand::Pause);
        self.active = false;
    }

    fn resume(&mut self, _state: &TimerState) {
        self.generation += 1;
        self.active = self.worker.send(WorkerCommand::Resume {
            generation: self.generation,
        });
    }

    fn stop(&mut self) {
        self.worker.send(WorkerCommand::Reset);
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for WorkerDriver {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}
