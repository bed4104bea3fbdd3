use clap::Subcommand;
use taskgate_core::App;

#[derive(Subcommand)]
pub enum QuestAction {
    /// List current quests
    List,
}

pub fn run(action: QuestAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        QuestAction::List => {
            let quests = app.quests().list_quests()?;
            println!("{}", serde_json::to_string_pretty(&quests)?);
        }
    }
    Ok(())
}
