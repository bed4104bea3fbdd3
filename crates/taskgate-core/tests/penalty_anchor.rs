//! Penalty anchor behavior across process restarts and clock manipulation.
//!
//! Each "process" opens the on-disk database afresh with its own clock, the
//! way the CLI and the daemon do.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use taskgate_core::penalty::Observation;
use taskgate_core::{Database, ManualClock, PenaltyManager, PenaltyPolicy};

const HOUR: Duration = Duration::from_secs(3600);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn manager(path: &Path, clock: Arc<ManualClock>) -> PenaltyManager {
    let db = Arc::new(Database::open_at(path).unwrap());
    PenaltyManager::new(db, clock, PenaltyPolicy::default())
}

#[test]
fn wall_clock_rolled_back_past_deadline_keeps_penalty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskgate.db");

    let clock = Arc::new(ManualClock::new(t0(), Duration::from_secs(20_000)));
    manager(&path, clock.clone()).trigger_penalty(HOUR).unwrap();

    // 10 real minutes later the user sets the clock two days back, restarts.
    clock.advance(Duration::from_secs(600));
    clock.set_wall(t0() - chrono::Duration::days(2));
    let status = manager(&path, clock.clone()).status().unwrap();
    assert!(status.active);
    assert_eq!(status.remaining_ms, 50 * 60 * 1000);
    assert!(matches!(status.observation, Observation::Tampered { .. }));
}

#[test]
fn wall_clock_pushed_forward_past_deadline_keeps_penalty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskgate.db");

    let clock = Arc::new(ManualClock::new(t0(), Duration::from_secs(20_000)));
    manager(&path, clock.clone()).trigger_penalty(HOUR).unwrap();

    clock.advance(Duration::from_secs(60));
    clock.set_wall(t0() + chrono::Duration::hours(3));
    let restarted = manager(&path, clock.clone());
    assert!(restarted.is_penalty_active().unwrap());

    // Honest real time still ends it.
    clock.advance(Duration::from_secs(3540));
    assert!(!restarted.is_penalty_active().unwrap());
}

#[test]
fn reboot_keeps_penalty_for_one_observation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskgate.db");

    let clock = Arc::new(ManualClock::new(t0(), Duration::from_secs(20_000)));
    manager(&path, clock.clone()).trigger_penalty(HOUR).unwrap();

    // Down for three hours, then up for two minutes.
    clock.reboot(Duration::from_secs(3 * 3600), Duration::from_secs(120));
    let after_boot = manager(&path, clock.clone());
    let status = after_boot.status().unwrap();
    assert!(status.active);
    assert!(matches!(status.observation, Observation::Rebooted { .. }));
    assert_eq!(status.remaining_ms, 58 * 60 * 1000);

    clock.advance(Duration::from_secs(58 * 60));
    assert!(!after_boot.is_penalty_active().unwrap());
}

#[test]
fn concurrent_triggers_settle_on_latest_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskgate.db");
    let clock = Arc::new(ManualClock::new(t0(), Duration::from_secs(20_000)));
    let db = Arc::new(Database::open_at(&path).unwrap());
    let penalty = Arc::new(PenaltyManager::new(
        db,
        clock.clone(),
        PenaltyPolicy {
            max_cas_retries: 64,
            ..PenaltyPolicy::default()
        },
    ));

    let handles: Vec<_> = (1..=8u64)
        .map(|i| {
            let penalty = penalty.clone();
            std::thread::spawn(move || penalty.trigger_penalty(Duration::from_secs(i * 600)).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let status = penalty.status().unwrap();
    assert_eq!(status.until, Some(t0() + chrono::Duration::seconds(8 * 600)));
    assert_eq!(penalty.last_system_time().unwrap(), Some(t0()));
}
