use std::time::Duration;

use clap::Subcommand;
use taskgate_core::App;

#[derive(Subcommand)]
pub enum PenaltyAction {
    /// Start (or extend) a penalty window
    Trigger {
        /// Length in minutes (defaults to penalty.default_duration_minutes)
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Lift the penalty
    Clear,
    /// Show the penalty state as JSON
    Status,
}

pub fn run(action: PenaltyAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        PenaltyAction::Trigger { minutes } => {
            let duration = minutes
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or_else(|| app.config.default_penalty_duration());
            let status = app.penalty.trigger_penalty(duration)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        PenaltyAction::Clear => {
            app.penalty.clear_penalty()?;
            println!("penalty cleared");
        }
        PenaltyAction::Status => {
            let status = app.penalty.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
