use clap::{Parser, Subcommand};
use taskgate_core::Config;

mod commands;

#[derive(Parser)]
#[command(name = "taskgate", version, about = "Block distractions until your tasks are done")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether distractions are currently blocked
    Status {
        /// Print the full verdict as JSON
        #[arg(long)]
        json: bool,
    },
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Penalty control
    Penalty {
        #[command(subcommand)]
        action: commands::penalty::PenaltyAction,
    },
    /// Bonus tasks, credits and exemptions
    Bonus {
        #[command(subcommand)]
        action: commands::bonus::BonusAction,
    },
    /// Run scheduled workers
    Worker {
        #[command(subcommand)]
        action: commands::worker::WorkerAction,
    },
    /// Habit contribution history
    Contributions {
        #[command(subcommand)]
        action: commands::contributions::ContributionsAction,
    },
    /// Quest board
    Quest {
        #[command(subcommand)]
        action: commands::quest::QuestAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    taskgate_core::logging::init_logging(&Config::load_or_default().logging.level);

    let result = match cli.command {
        Commands::Status { json } => commands::status::run(json),
        Commands::Task { action } => commands::task::run(action),
        Commands::Penalty { action } => commands::penalty::run(action),
        Commands::Bonus { action } => commands::bonus::run(action),
        Commands::Worker { action } => commands::worker::run(action),
        Commands::Contributions { action } => commands::contributions::run(action),
        Commands::Quest { action } => commands::quest::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
