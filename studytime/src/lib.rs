//! Study timer engine.
//!
//! A countdown/stopwatch that survives restarts: the [`timer`] store holds
//! the state, [`persistence`] mirrors it to disk and reconciles the time that
//! passed while nothing was running, and a tick source from [`driver`] or
//! [`worker`] advances it. [`service`] ties the three together behind a
//! message queue that the terminal display and the IPC server share.

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod ipc;
pub mod persistence;
pub mod service;
pub mod timer;
pub mod worker;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{PersistenceError, ServiceError, TimerError};
pub use persistence::{FileStore, MemoryStore, PersistenceBridge, Snapshot, SnapshotStore};
pub use service::{ServiceEvent, ServiceHandle, TimerService};
pub use timer::{TickOutcome, TimerState, TimerStore};
