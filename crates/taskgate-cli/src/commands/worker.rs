//! Worker commands: one-shot runs and the long-running daemon.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use clap::{Subcommand, ValueEnum};
use taskgate_core::blocking::watch_verdicts;
use taskgate_core::{App, DecisionEngine, VerdictFeed, WorkScheduler, Worker, WorkerKind};
use tracing::{info, warn};

#[derive(Clone, Copy, ValueEnum)]
pub enum Target {
    Reset,
    Contribution,
    Reminder,
    Quests,
    All,
}

impl Target {
    fn kinds(self) -> Vec<WorkerKind> {
        match self {
            Target::Reset => vec![WorkerKind::Reset],
            Target::Contribution => vec![WorkerKind::Contribution],
            Target::Reminder => vec![WorkerKind::Reminder],
            Target::Quests => vec![WorkerKind::Quests],
            Target::All => WorkerKind::ALL.to_vec(),
        }
    }
}

#[derive(Subcommand)]
pub enum WorkerAction {
    /// Run workers once, with retries, and print their reports
    Run {
        #[arg(value_enum, default_value = "all")]
        target: Target,
    },
    /// Run every worker periodically and publish verdict changes until Ctrl-C
    Daemon {
        /// Seconds between worker passes (defaults to workers.daemon_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build()
}

pub fn run(action: WorkerAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        WorkerAction::Run { target } => {
            let workers: Vec<_> = target.kinds().into_iter().map(|k| app.worker(k)).collect();
            let reports = runtime()?.block_on(app.scheduler().run_all(&workers));
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        WorkerAction::Daemon { interval } => {
            let every = Duration::from_secs(
                interval
                    .unwrap_or(app.config.workers.daemon_interval_secs)
                    .max(1),
            );
            runtime()?.block_on(daemon(app, every));
        }
    }
    Ok(())
}

async fn daemon(app: App, every: Duration) {
    let workers = app.workers();
    let scheduler = app.scheduler();
    run_daemon(app.engine.clone(), workers, scheduler, every, tokio::signal::ctrl_c()).await;
}

/// Run `workers` every `every` and log verdict changes until `shutdown`
/// resolves. Shutdown also cancels a worker pass that is still retrying.
async fn run_daemon<S>(
    engine: Arc<DecisionEngine>,
    workers: Vec<Arc<dyn Worker>>,
    scheduler: WorkScheduler,
    every: Duration,
    shutdown: S,
) where
    S: Future,
{
    let feed = Arc::new(VerdictFeed::new());
    let mut verdicts = feed.subscribe();
    let watcher = tokio::spawn(watch_verdicts(engine, feed.clone(), Duration::from_secs(5)));

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);
    info!(interval_secs = every.as_secs(), "daemon started");

    'daemon: loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    reports = scheduler.run_all(&workers) => {
                        for report in reports {
                            info!(worker = report.worker, outcome = ?report.outcome, attempts = report.attempts, "worker finished");
                        }
                    }
                    _ = &mut shutdown => break 'daemon,
                }
            }
            changed = verdicts.changed() => {
                if changed.is_err() {
                    warn!("verdict feed closed");
                    break;
                }
                if let Some(verdict) = verdicts.borrow_and_update().clone() {
                    info!(blocked = verdict.blocked, reason = ?verdict.reason, "verdict changed");
                }
            }
            _ = &mut shutdown => break,
        }
    }
    info!("shutting down");
    watcher.abort();
}
