//! The timer service: single owner of the store, its snapshot and its tick
//! source.
//!
//! Commands arrive on one queue and are applied one at a time, so they are
//! totally ordered. Driver events arrive on a second queue and are applied
//! in arrival order, after checking that they belong to the current run.

use crate::clock::Clock;
use crate::driver::{DriverEvent, DriverKind, TickDriver, TickSource};
use crate::error::ServiceError;
use crate::persistence::{PersistenceBridge, Restored};
use crate::timer::{TickOutcome, TimerState, TimerStore};
use crate::worker::WorkerDriver;
use std::sync::Arc;
use studytime_ipc::{Command, Response, TimerState as RunState, TimerStatus};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Published to every subscriber of the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Changed(TimerStatus),
    /// A countdown reached zero while the service was watching it.
    Completed,
}

struct Request {
    command: Command,
    reply: oneshot::Sender<Response>,
}

/// Cloneable handle used by front ends to reach the service.
#[derive(Clone)]
pub struct ServiceHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<ServiceEvent>,
}

impl ServiceHandle {
    pub async fn send(&self, command: Command) -> Result<Response, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Same as [`send`](Self::send) for callers outside the runtime.
    pub fn blocking_send(&self, command: Command) -> Result<Response, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .blocking_send(Request { command, reply })
            .map_err(|_| ServiceError::Closed)?;
        rx.blocking_recv().map_err(|_| ServiceError::Closed)
    }

    pub async fn status(&self) -> Result<Option<TimerStatus>, ServiceError> {
        match self.send(Command::Status).await? {
            Response::Status(status) => Ok(Some(status)),
            _ => Ok(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }
}

pub struct TimerService {
    store: TimerStore,
    bridge: PersistenceBridge,
    source: Box<dyn TickSource>,
    driver_events: mpsc::UnboundedReceiver<DriverEvent>,
    requests: mpsc::Receiver<Request>,
    events: broadcast::Sender<ServiceEvent>,
    /// The source cannot continue the paused run (duration changed while
    /// paused, or the pause was restored from a snapshot); the next resume
    /// restarts it from the store's value.
    rebase_on_resume: bool,
}

impl TimerService {
    /// Build the service and its handle. Must be called inside a tokio runtime.
    pub fn new(
        clock: Arc<dyn Clock>,
        bridge: PersistenceBridge,
        driver: DriverKind,
    ) -> (Self, ServiceHandle) {
        let (driver_tx, driver_events) = mpsc::unbounded_channel();
        let source: Box<dyn TickSource> = match driver {
            DriverKind::Foreground => Box::new(TickDriver::new(driver_tx)),
            DriverKind::Worker => Box::new(WorkerDriver::spawn(driver_tx)),
        };
        let (request_tx, requests) = mpsc::channel(64);
        let (events, _) = broadcast::channel(64);
        let handle = ServiceHandle {
            requests: request_tx,
            events: events.clone(),
        };
        let service = Self {
            store: TimerStore::new(clock),
            bridge,
            source,
            driver_events,
            requests,
            events,
            rebase_on_resume: false,
        };
        (service, handle)
    }

    /// Load the last snapshot (or `defaults`) and pick up where it left off.
    pub fn restore(&mut self, defaults: TimerState) -> Restored {
        let restored = self.bridge.restore(defaults, self.store.now());
        self.store.initialize(restored.state.clone());
        self.persist();
        if restored.state.is_ticking() {
            self.source.start(&restored.state);
        }
        // A paused snapshot has no paused run in the fresh source to continue
        self.rebase_on_resume = restored.state.run_state() == RunState::Paused;
        restored
    }

    pub fn store(&self) -> &TimerStore {
        &self.store
    }

    pub async fn run(mut self) {
        info!("Timer service running");
        loop {
            tokio::select! {
                biased;

                request = self.requests.recv() => {
                    let Some(Request { command, reply }) = request else { break };
                    let response = self.handle(command);
                    if reply.send(response).is_err() {
                        debug!("Requester went away before the reply");
                    }
                }
                Some(event) = self.driver_events.recv() => self.on_driver_event(event),
            }
        }
        self.source.stop();
        if let Some(state) = self.store.state() {
            self.bridge.save(state, self.store.now());
        }
        info!("Timer service stopped");
    }

    /// Apply one command and bring the tick source in line with the result.
    pub fn handle(&mut self, command: Command) -> Response {
        let before = self.run_state();
        let result = match &command {
            Command::Start => self.store.start(),
            Command::Pause => self.store.pause(),
            Command::Resume => self.store.resume(),
            Command::Reset => self.store.reset(),
            Command::SetMode { mode } => self.store.set_mode(*mode),
            Command::SetDuration { minutes, seconds } => {
                self.store.set_duration(*minutes, *seconds)
            }
            Command::SetAlarm { id } => self.store.set_alarm(id.as_str()),
            Command::SetSubject { subject_id } => self.store.set_subject(*subject_id),
            Command::SetTopic { topic } => self.store.set_topic(topic.as_str()),
            Command::SetSessionStart { at } => self.store.set_session_start(*at),
            Command::Status => {
                return match self.store.status() {
                    Some(status) => Response::Status(status),
                    None => Response::Error("timer store is not initialized".to_string()),
                };
            }
        };

        match result {
            Ok(true) => {
                debug!("Applied {:?}", command);
                self.align_source(before, &command);
                self.persist();
                self.publish_change();
                Response::Ok
            }
            Ok(false) => {
                debug!("{:?} had no effect", command);
                Response::Ok
            }
            Err(e) => {
                debug!("Ignoring {:?}: {}", command, e);
                Response::Error(e.to_string())
            }
        }
    }

    fn run_state(&self) -> RunState {
        self.store
            .state()
            .map(TimerState::run_state)
            .unwrap_or(RunState::Idle)
    }

    fn align_source(&mut self, before: RunState, command: &Command) {
        let Some(state) = self.store.state() else {
            return;
        };
        let after = state.run_state();
        let retimed = matches!(command, Command::SetDuration { .. });
        match (before, after) {
            (RunState::Idle, RunState::Running) => self.source.start(state),
            (RunState::Running, RunState::Paused) => self.source.pause(),
            (RunState::Paused, RunState::Running) => {
                if self.rebase_on_resume {
                    self.source.start(state);
                } else {
                    self.source.resume(state);
                }
            }
            (RunState::Running, RunState::Running) if retimed => self.source.start(state),
            (RunState::Paused, RunState::Paused) if retimed => self.rebase_on_resume = true,
            (RunState::Running | RunState::Paused, RunState::Idle) => self.source.stop(),
            _ => {}
        }
        if after != RunState::Paused {
            self.rebase_on_resume = false;
        }
    }

    fn on_driver_event(&mut self, event: DriverEvent) {
        if event.generation() != self.source.generation() {
            debug!("Dropping stale {:?}", event);
            return;
        }
        let outcome = match event {
            DriverEvent::Tick { .. } => self.store.tick(),
            DriverEvent::Sync { seconds, .. } => self.store.sync(seconds),
            DriverEvent::Complete { .. } => self.store.sync(0),
        };
        match outcome {
            Ok(TickOutcome::Ignored) => {}
            Ok(TickOutcome::Advanced) => {
                self.persist();
                self.publish_change();
            }
            Ok(TickOutcome::Completed) => {
                info!("Countdown complete");
                self.source.stop();
                self.persist();
                self.publish_change();
                let _ = self.events.send(ServiceEvent::Completed);
            }
            Err(e) => warn!("Tick on unusable store: {}", e),
        }
    }

    fn persist(&self) {
        if let Some(state) = self.store.state() {
            self.bridge.save(state, self.store.now());
        }
    }

    fn publish_change(&self) {
        if let Some(status) = self.store.status() {
            // no subscribers is fine
            let _ = self.events.send(ServiceEvent::Changed(status));
        }
    }
}
