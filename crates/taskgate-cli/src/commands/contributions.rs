use clap::Subcommand;
use taskgate_core::App;

#[derive(Subcommand)]
pub enum ContributionsAction {
    /// List recorded clean days, newest first
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: ContributionsAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        ContributionsAction::List { json } => {
            let rows = app.contributions().list_contributions()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in &rows {
                    println!("{}  +{}  {}", row.date, row.value, row.reason);
                }
            }
        }
    }
    Ok(())
}
