//! Last-value-wins distribution of verdicts.
//!
//! Subscribers only ever observe the most recent verdict; intermediate values
//! published between two reads are dropped. Nothing else is promised about
//! delivery.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::engine::{DecisionEngine, Verdict};

pub struct VerdictFeed {
    tx: watch::Sender<Option<Verdict>>,
}

impl VerdictFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the current verdict. Returns whether the blocked flag or
    /// reason changed.
    pub fn publish(&self, verdict: Verdict) -> bool {
        self.tx.send_if_modified(|current| {
            let changed = current
                .as_ref()
                .map_or(true, |c| c.blocked != verdict.blocked || c.reason != verdict.reason);
            *current = Some(verdict);
            changed
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Verdict>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<Verdict> {
        self.tx.borrow().clone()
    }
}

impl Default for VerdictFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate every `interval` and publish changes until the returned future
/// is dropped or every subscriber and the feed itself are gone.
///
/// Evaluation errors are logged and skipped; the previous verdict stays
/// visible rather than being replaced by an "allow".
pub async fn watch_verdicts(engine: Arc<DecisionEngine>, feed: Arc<VerdictFeed>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let engine = engine.clone();
        match tokio::task::spawn_blocking(move || engine.evaluate()).await {
            Ok(Ok(verdict)) => {
                if feed.publish(verdict) {
                    debug!("verdict changed");
                }
            }
            Ok(Err(e)) => warn!(error = %e, "verdict evaluation failed"),
            Err(e) => warn!(error = %e, "verdict evaluation task panicked"),
        }
    }
}
