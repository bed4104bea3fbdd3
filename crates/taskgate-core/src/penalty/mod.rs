//! Penalty windows with a tamper-resistant time anchor.
//!
//! A penalty forces blocking for a fixed amount of *real* time. The wall clock
//! alone cannot be trusted for that (the user can change it), so every
//! observation of an active penalty persists an anchor pair
//! `(wall time, device uptime)` and measures progress with the uptime delta.
//!
//! ## Observation rules
//!
//! - Remaining time is always the remaining time at the anchor minus the
//!   uptime delta, and the deadline is re-expressed in the current wall
//!   frame. Moving the clock in either direction, by any amount, never ends
//!   a penalty early.
//! - Wall and uptime deltas disagreeing by more than `tamper_tolerance` is
//!   reported (and logged) as tampering.
//! - Uptime went backward: the device rebooted. Only the current uptime is
//!   credited (a lower bound of real elapsed time) and the penalty stays
//!   active for this observation; the next one decides expiry.
//!
//! All writes are compare-and-swap on the stored revision so two enforcement
//! paths triggering at once cannot interleave their anchors.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{CoreError, Result};

/// Persisted penalty state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PenaltyState {
    /// Wall clock at the last observation (`None` before the first one)
    pub last_system_time: Option<DateTime<Utc>>,
    /// Device uptime at the last observation
    pub last_elapsed_realtime: Duration,
    /// Deadline in the wall frame of the last observation
    pub penalty_active_until: Option<DateTime<Utc>>,
    /// Incremented by the store on every successful write
    pub revision: u64,
}

impl PenaltyState {
    fn anchored(&self, wall: DateTime<Utc>, uptime: Duration, until: Option<DateTime<Utc>>) -> Self {
        Self {
            last_system_time: Some(wall),
            last_elapsed_realtime: uptime,
            penalty_active_until: until,
            revision: self.revision,
        }
    }

    /// Same observable values, ignoring the revision counter.
    fn same_values(&self, other: &Self) -> bool {
        self.last_system_time == other.last_system_time
            && self.last_elapsed_realtime == other.last_elapsed_realtime
            && self.penalty_active_until == other.penalty_active_until
    }
}

/// Persistence contract for the penalty anchor.
pub trait PenaltyStore: Send + Sync {
    fn load(&self) -> Result<PenaltyState>;

    /// Write `next` only if the stored revision still equals `expected`.
    /// The stored revision becomes `expected + 1` on success.
    fn compare_and_swap(&self, expected: u64, next: &PenaltyState) -> Result<bool>;
}

/// What a single observation concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// No penalty stored
    Idle,
    /// Penalty running, clocks consistent
    Counting { remaining_ms: u64 },
    /// Wall clock disagreed with uptime by `skew_ms`; uptime was trusted
    Tampered { remaining_ms: u64, skew_ms: i64 },
    /// Uptime went backward; elapsed time since the anchor is unknown
    Rebooted { remaining_ms: u64 },
    /// Penalty ran out on this observation
    Expired,
}

impl Observation {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Observation::Counting { .. } | Observation::Tampered { .. } | Observation::Rebooted { .. }
        )
    }
}

/// Tunables for the anchor logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyPolicy {
    /// Allowed disagreement between wall and uptime deltas
    pub tamper_tolerance: Duration,
    /// Compare-and-swap attempts before reporting contention
    pub max_cas_retries: u32,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            tamper_tolerance: Duration::from_secs(10),
            max_cas_retries: 8,
        }
    }
}

/// Snapshot for display and enforcement diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyStatus {
    pub active: bool,
    /// Deadline expressed in the current wall frame
    pub until: Option<DateTime<Utc>>,
    pub remaining_ms: u64,
    pub observation: Observation,
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

fn millis(d: chrono::Duration) -> u64 {
    d.num_milliseconds().max(0) as u64
}

/// Apply one observation at `(wall, uptime)` to `state`.
///
/// Returns the settled state (anchor refreshed while a penalty is active)
/// and what was observed. Pure; persistence is the caller's job.
pub fn settle(
    state: &PenaltyState,
    wall: DateTime<Utc>,
    uptime: Duration,
    tolerance: Duration,
) -> (PenaltyState, Observation) {
    let Some(until) = state.penalty_active_until else {
        return (state.clone(), Observation::Idle);
    };
    let anchor_wall = state.last_system_time.unwrap_or(wall);
    let anchor_uptime = state.last_elapsed_realtime;
    let remaining_at_anchor = until - anchor_wall;

    if uptime + tolerance < anchor_uptime {
        let remaining = (remaining_at_anchor - to_chrono(uptime)).max(chrono::Duration::zero());
        let next = state.anchored(wall, uptime, Some(wall + remaining));
        return (
            next,
            Observation::Rebooted {
                remaining_ms: millis(remaining),
            },
        );
    }

    let uptime_delta = to_chrono(uptime.saturating_sub(anchor_uptime));
    let wall_delta = wall - anchor_wall;
    let skew = wall_delta - uptime_delta;

    let remaining = remaining_at_anchor - uptime_delta;
    if remaining <= chrono::Duration::zero() {
        return (state.anchored(wall, uptime, None), Observation::Expired);
    }

    let next = state.anchored(wall, uptime, Some(wall + remaining));
    let observation = if skew.abs() > to_chrono(tolerance) {
        Observation::Tampered {
            remaining_ms: millis(remaining),
            skew_ms: skew.num_milliseconds(),
        }
    } else {
        Observation::Counting {
            remaining_ms: millis(remaining),
        }
    };
    (next, observation)
}

/// Owner of the penalty state machine.
pub struct PenaltyManager {
    store: Arc<dyn PenaltyStore>,
    clock: Arc<dyn Clock>,
    policy: PenaltyPolicy,
}

impl PenaltyManager {
    pub fn new(store: Arc<dyn PenaltyStore>, clock: Arc<dyn Clock>, policy: PenaltyPolicy) -> Self {
        Self { store, clock, policy }
    }

    /// Whether blocking is forced by a penalty right now.
    ///
    /// Persists the refreshed anchor while a penalty is active; a no-op read
    /// when none is stored.
    ///
    /// # Errors
    /// Propagates store failures and `Contention` after repeated CAS losses.
    pub fn is_penalty_active(&self) -> Result<bool> {
        Ok(self.status()?.active)
    }

    /// Observe and report the current penalty.
    pub fn status(&self) -> Result<PenaltyStatus> {
        let (state, observation) = self.transact(|settled, _, _, _| settled)?;
        let remaining_ms = match observation {
            Observation::Counting { remaining_ms }
            | Observation::Tampered { remaining_ms, .. }
            | Observation::Rebooted { remaining_ms } => remaining_ms,
            Observation::Idle | Observation::Expired => 0,
        };
        Ok(PenaltyStatus {
            active: observation.is_active(),
            until: state.penalty_active_until,
            remaining_ms,
            observation,
        })
    }

    /// Force blocking for `duration` of real time from now.
    ///
    /// An already-running penalty that ends later is kept as is.
    pub fn trigger_penalty(&self, duration: Duration) -> Result<PenaltyStatus> {
        let requested = to_chrono(duration);
        self.transact(|settled, _, wall, uptime| {
            let candidate = wall
                .checked_add_signed(requested)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            let until = match settled.penalty_active_until {
                Some(existing) if existing > candidate => existing,
                _ => candidate,
            };
            settled.anchored(wall, uptime, Some(until))
        })?;
        info!(duration_secs = duration.as_secs(), "penalty triggered");
        self.status()
    }

    /// End any penalty immediately.
    pub fn clear_penalty(&self) -> Result<()> {
        self.transact(|settled, _, wall, uptime| settled.anchored(wall, uptime, None))?;
        info!("penalty cleared");
        Ok(())
    }

    pub fn last_system_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.store.load()?.last_system_time)
    }

    pub fn last_elapsed_realtime(&self) -> Result<Duration> {
        Ok(self.store.load()?.last_elapsed_realtime)
    }

    /// Settle the current state, let `mutate` adjust it (given the wall time
    /// and uptime of this attempt), and persist the result
    /// with compare-and-swap. Retries from a fresh read when another writer wins.
    fn transact<F>(&self, mutate: F) -> Result<(PenaltyState, Observation)>
    where
        F: Fn(PenaltyState, Observation, DateTime<Utc>, Duration) -> PenaltyState,
    {
        for _ in 0..self.policy.max_cas_retries.max(1) {
            let current = self.store.load()?;
            let wall = self.clock.now();
            let uptime = self.clock.elapsed_realtime();

            let (settled, observation) = settle(&current, wall, uptime, self.policy.tamper_tolerance);
            match observation {
                Observation::Tampered { skew_ms, .. } => {
                    warn!(skew_ms, "wall clock disagrees with uptime; trusting uptime")
                }
                Observation::Rebooted { .. } => {
                    warn!("uptime went backward; treating as reboot and keeping penalty")
                }
                Observation::Expired => info!("penalty expired"),
                _ => {}
            }

            let mut next = mutate(settled, observation, wall, uptime);
            // Writing a fresh anchor while idle would only churn the row.
            if next.penalty_active_until.is_none() && current.penalty_active_until.is_none() {
                next = current.clone();
            }
            if next.same_values(&current) {
                return Ok((current, observation));
            }
            if self.store.compare_and_swap(current.revision, &next)? {
                next.revision = current.revision + 1;
                return Ok((next, observation));
            }
            debug!(revision = current.revision, "penalty anchor changed underneath; retrying");
        }
        Err(CoreError::Contention {
            resource: "penalty anchor",
            attempts: self.policy.max_cas_retries.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<PenaltyState>,
    }

    impl PenaltyStore for MemoryStore {
        fn load(&self) -> Result<PenaltyState> {
            Ok(self.state.lock().unwrap().clone())
        }

        fn compare_and_swap(&self, expected: u64, next: &PenaltyState) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            if state.revision != expected {
                return Ok(false);
            }
            *state = PenaltyState {
                revision: expected + 1,
                ..next.clone()
            };
            Ok(true)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, PenaltyManager) {
        let clock = Arc::new(ManualClock::new(t0(), Duration::from_secs(10_000)));
        let store = Arc::new(MemoryStore::default());
        let manager = PenaltyManager::new(store.clone(), clock.clone(), PenaltyPolicy::default());
        (clock, store, manager)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn inactive_by_default_and_no_write() {
        let (_clock, store, manager) = setup();
        assert!(!manager.is_penalty_active().unwrap());
        assert_eq!(store.load().unwrap().revision, 0);
    }

    #[test]
    fn trigger_anchors_and_stays_active_until_elapsed() {
        let (clock, _store, manager) = setup();
        manager.trigger_penalty(HOUR).unwrap();
        assert_eq!(manager.last_system_time().unwrap(), Some(t0()));
        assert_eq!(manager.last_elapsed_realtime().unwrap(), Duration::from_secs(10_000));

        clock.advance(Duration::from_secs(1800));
        assert!(manager.is_penalty_active().unwrap());

        clock.advance(Duration::from_secs(1801));
        assert!(!manager.is_penalty_active().unwrap());
    }

    #[test]
    fn observation_refreshes_anchor() {
        let (clock, _store, manager) = setup();
        manager.trigger_penalty(HOUR).unwrap();
        clock.advance(Duration::from_secs(60));
        manager.is_penalty_active().unwrap();
        assert_eq!(
            manager.last_system_time().unwrap(),
            Some(t0() + chrono::Duration::seconds(60))
        );
        assert_eq!(manager.last_elapsed_realtime().unwrap(), Duration::from_secs(10_060));
    }

    #[test]
    fn wall_clock_forward_jump_does_not_end_penalty() {
        let (clock, _store, manager) = setup();
        manager.trigger_penalty(HOUR).unwrap();
        clock.advance(Duration::from_secs(600));
        clock.set_wall(t0() + chrono::Duration::hours(5));

        let status = manager.status().unwrap();
        assert!(status.active);
        assert!(matches!(status.observation, Observation::Tampered { .. }));
        assert_eq!(status.remaining_ms, 3_000_000);
    }

    #[test]
    fn small_forward_nudges_do_not_accumulate() {
        let (clock, _store, manager) = setup();
        manager.trigger_penalty(HOUR).unwrap();

        // Each poll the wall clock is pushed 9s ahead, just under tolerance.
        for _ in 0..400 {
            clock.advance(Duration::from_millis(100));
            clock.set_wall(clock.now() + chrono::Duration::seconds(9));
            assert!(manager.is_penalty_active().unwrap());
        }
        let status = manager.status().unwrap();
        assert!(matches!(status.observation, Observation::Counting { .. }));
        assert_eq!(status.remaining_ms, 3_600_000 - 40_000);
    }

    #[test]
    fn wall_clock_rollback_keeps_monotonic_remaining() {
        let (clock, _store, manager) = setup();
        manager.trigger_penalty(HOUR).unwrap();
        clock.advance(Duration::from_secs(1200));
        clock.set_wall(t0() - chrono::Duration::days(2));

        let status = manager.status().unwrap();
        assert!(status.active);
        assert_eq!(status.remaining_ms, 2_400_000);

        // Real time keeps counting in the new wall frame.
        clock.advance(Duration::from_secs(2399));
        assert!(manager.is_penalty_active().unwrap());
        clock.advance(Duration::from_secs(2));
        assert!(!manager.is_penalty_active().unwrap());
    }

    #[test]
    fn reboot_keeps_penalty_for_one_observation() {
        let (clock, _store, manager) = setup();
        manager.trigger_penalty(HOUR).unwrap();
        // Off for two hours, 30s uptime after boot.
        clock.reboot(Duration::from_secs(7200), Duration::from_secs(30));

        let status = manager.status().unwrap();
        assert!(status.active);
        assert!(matches!(status.observation, Observation::Rebooted { .. }));
        assert_eq!(status.remaining_ms, 3_570_000);

        clock.advance(Duration::from_secs(3571));
        assert!(!manager.is_penalty_active().unwrap());
    }

    #[test]
    fn trigger_never_shortens_running_penalty() {
        let (clock, _store, manager) = setup();
        manager.trigger_penalty(HOUR * 2).unwrap();
        clock.advance(Duration::from_secs(60));
        let status = manager.trigger_penalty(Duration::from_secs(60)).unwrap();
        assert_eq!(status.until, Some(t0() + chrono::Duration::hours(2)));
    }

    #[test]
    fn clear_ends_penalty() {
        let (_clock, _store, manager) = setup();
        manager.trigger_penalty(HOUR).unwrap();
        manager.clear_penalty().unwrap();
        assert!(!manager.is_penalty_active().unwrap());
    }

    #[test]
    fn settle_is_idle_without_deadline() {
        let state = PenaltyState::default();
        let (next, obs) = settle(&state, t0(), Duration::from_secs(5), Duration::from_secs(10));
        assert_eq!(obs, Observation::Idle);
        assert_eq!(next, state);
    }

    #[test]
    fn settle_counts_uptime_even_within_tolerance() {
        let state = PenaltyState {
            last_system_time: Some(t0()),
            last_elapsed_realtime: Duration::from_secs(100),
            penalty_active_until: Some(t0() + chrono::Duration::hours(1)),
            revision: 3,
        };
        // Wall ran 5s ahead of uptime: within tolerance.
        let (next, obs) = settle(
            &state,
            t0() + chrono::Duration::seconds(65),
            Duration::from_secs(160),
            Duration::from_secs(10),
        );
        assert_eq!(obs, Observation::Counting { remaining_ms: 3_540_000 });
        // The 5s of skew is not credited; the deadline moves with the wall.
        assert_eq!(
            next.penalty_active_until,
            Some(t0() + chrono::Duration::seconds(65 + 3540))
        );
    }

    struct FlakyStore {
        inner: MemoryStore,
        losses: Mutex<u32>,
    }

    impl PenaltyStore for FlakyStore {
        fn load(&self) -> Result<PenaltyState> {
            self.inner.load()
        }

        fn compare_and_swap(&self, expected: u64, next: &PenaltyState) -> Result<bool> {
            let mut losses = self.losses.lock().unwrap();
            if *losses > 0 {
                *losses -= 1;
                return Ok(false);
            }
            self.inner.compare_and_swap(expected, next)
        }
    }

    #[test]
    fn contention_is_reported_after_retries() {
        let clock = Arc::new(ManualClock::new(t0(), Duration::from_secs(1)));
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::default(),
            losses: Mutex::new(100),
        });
        let manager = PenaltyManager::new(store, clock, PenaltyPolicy::default());
        assert!(matches!(
            manager.trigger_penalty(HOUR),
            Err(CoreError::Contention { attempts: 8, .. })
        ));
    }

    #[test]
    fn transient_cas_loss_is_retried() {
        let clock = Arc::new(ManualClock::new(t0(), Duration::from_secs(1)));
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::default(),
            losses: Mutex::new(2),
        });
        let manager = PenaltyManager::new(store, clock, PenaltyPolicy::default());
        assert!(manager.trigger_penalty(HOUR).unwrap().active);
    }
}
