//! Wall and monotonic time sources.
//!
//! Every policy decision reads time through [`Clock`] so that tests can move
//! the wall clock independently of device uptime (the anti-tamper model
//! depends on exactly that separation).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Source of wall-clock time and monotonic device uptime.
pub trait Clock: Send + Sync {
    /// Current wall-clock time. The user can change this at will.
    fn now(&self) -> DateTime<Utc>;

    /// Time since device boot. Never goes backward except across a reboot.
    fn elapsed_realtime(&self) -> Duration;
}

/// Clock backed by the OS wall clock and device uptime.
///
/// Uptime is sampled once from the OS at construction (second resolution)
/// and advanced with a process-local [`Instant`] afterwards.
pub struct SystemClock {
    boot_offset: Duration,
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot_offset: Duration::from_secs(sysinfo::System::uptime()),
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn elapsed_realtime(&self) -> Duration {
        self.boot_offset + self.started.elapsed()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(DateTime<Utc>, Duration)>,
}

impl ManualClock {
    pub fn new(wall: DateTime<Utc>, uptime: Duration) -> Self {
        Self {
            state: Mutex::new((wall, uptime)),
        }
    }

    /// Advance both clocks by the same real duration.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.0 += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        state.1 += by;
    }

    /// Set the wall clock only, as a user changing the system time would.
    pub fn set_wall(&self, wall: DateTime<Utc>) {
        self.lock().0 = wall;
    }

    /// Simulate a reboot: uptime restarts from `uptime`, wall clock keeps going.
    pub fn reboot(&self, downtime: Duration, uptime: Duration) {
        let mut state = self.lock();
        state.0 += chrono::Duration::from_std(downtime + uptime).unwrap_or(chrono::Duration::zero());
        state.1 = uptime;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, (DateTime<Utc>, Duration)> {
        // A panic while holding the guard cannot leave the pair half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().0
    }

    fn elapsed_realtime(&self) -> Duration {
        self.lock().1
    }
}
