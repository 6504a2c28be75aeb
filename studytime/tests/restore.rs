use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::fs;
use std::sync::Arc;
use studytime::clock::ManualClock;
use studytime::driver::DriverKind;
use studytime::persistence::{RestoreSource, STORAGE_KEY};
use studytime::{FileStore, PersistenceBridge, TimerService, TimerState};
use studytime_ipc::{Command, TimerMode};

fn start_service(dir: &std::path::Path, clock: ManualClock) -> TimerService {
    let bridge = PersistenceBridge::new(Box::new(FileStore::new(dir)));
    let (service, _handle) = TimerService::new(Arc::new(clock), bridge, DriverKind::Foreground);
    service
}

#[tokio::test]
async fn running_countdown_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let launched = Utc.with_ymd_and_hms(2024, 11, 4, 19, 0, 0).unwrap();

    let mut first = start_service(dir.path(), ManualClock::new(launched));
    let restored = first.restore(TimerState::default());
    assert_eq!(restored.source, RestoreSource::Defaults);
    first.handle(Command::SetTopic {
        topic: "Organic chemistry".into(),
    });
    first.handle(Command::Start);
    drop(first);

    let reopened = launched + ChronoDuration::seconds(90);
    let mut second = start_service(dir.path(), ManualClock::new(reopened));
    let restored = second.restore(TimerState::default());
    assert_eq!(restored.source, RestoreSource::Snapshot);
    assert_eq!(restored.gap_seconds, 90);

    let state = second.store().state().unwrap();
    assert_eq!(state.remaining_or_elapsed, 25 * 60 - 90);
    assert!(state.is_running && !state.is_paused);
    assert_eq!(state.session.topic, "Organic chemistry");
}

#[tokio::test]
async fn countdown_that_ran_out_while_closed_is_stopped_at_zero() {
    let dir = tempfile::tempdir().unwrap();
    let launched = Utc.with_ymd_and_hms(2024, 11, 4, 19, 0, 0).unwrap();

    let mut first = start_service(dir.path(), ManualClock::new(launched));
    first.restore(TimerState::default());
    first.handle(Command::SetDuration {
        minutes: 0,
        seconds: 30,
    });
    first.handle(Command::Start);
    drop(first);

    let mut second = start_service(
        dir.path(),
        ManualClock::new(launched + ChronoDuration::seconds(150)),
    );
    let restored = second.restore(TimerState::default());
    assert!(restored.expired_while_away);
    let state = second.store().state().unwrap();
    assert_eq!(state.remaining_or_elapsed, 0);
    assert!(!state.is_running);
}

#[tokio::test]
async fn corrupt_snapshot_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(format!("{}.json", STORAGE_KEY)), "{not json").unwrap();

    let now = Utc.with_ymd_and_hms(2024, 11, 4, 19, 0, 0).unwrap();
    let mut service = start_service(dir.path(), ManualClock::new(now));
    let restored = service.restore(TimerState::new(50 * 60, "chime"));
    assert_eq!(restored.source, RestoreSource::Defaults);

    let state = service.store().state().unwrap();
    assert_eq!(state.mode, TimerMode::Countdown);
    assert_eq!(state.remaining_or_elapsed, 50 * 60);
    assert_eq!(state.selected_alarm, "chime");

    // restore rewrites the file with a readable record
    let written = fs::read_to_string(dir.path().join(format!("{}.json", STORAGE_KEY))).unwrap();
    assert!(written.contains("\"lastUpdated\""));
}
