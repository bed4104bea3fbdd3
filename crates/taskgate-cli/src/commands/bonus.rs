use std::time::Duration;

use clap::Subcommand;
use taskgate_core::{App, BonusReward, ExemptionScope};

#[derive(Subcommand)]
pub enum BonusAction {
    /// Add a bonus task
    Add {
        /// What has to be done
        description: String,
        /// Grant an exemption of this many minutes on completion
        #[arg(long, conflicts_with = "credits", required_unless_present = "credits")]
        exempt_minutes: Option<u32>,
        /// Exemption scope: all-soft, category:<name> or task:<id>
        #[arg(long, default_value = "all-soft")]
        scope: String,
        /// Grant this many credits on completion
        #[arg(long)]
        credits: Option<u32>,
    },
    /// List bonus tasks
    List,
    /// Complete a bonus task and collect its reward
    Complete {
        /// Bonus task ID
        id: String,
    },
    /// Show the credit balance and active exemptions
    Credits,
    /// Spend one credit on an exemption
    Redeem {
        /// Exemption length in minutes
        #[arg(long, default_value = "30")]
        minutes: u64,
        /// Exemption scope: all-soft, category:<name> or task:<id>
        #[arg(long, default_value = "all-soft")]
        scope: String,
    },
}

fn parse_scope(raw: &str) -> Result<ExemptionScope, String> {
    match raw.split_once(':') {
        None if raw == "all-soft" => Ok(ExemptionScope::AllSoft),
        Some(("category", name)) if !name.is_empty() => Ok(ExemptionScope::Category(name.to_string())),
        Some(("task", id)) if !id.is_empty() => Ok(ExemptionScope::Task(id.to_string())),
        _ => Err(format!(
            "invalid scope '{raw}' (expected all-soft, category:<name> or task:<id>)"
        )),
    }
}

pub fn run(action: BonusAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;

    match action {
        BonusAction::Add {
            description,
            exempt_minutes,
            scope,
            credits,
        } => {
            let reward = match (exempt_minutes, credits) {
                (Some(minutes), _) => BonusReward::Exemption {
                    minutes,
                    scope: parse_scope(&scope)?,
                },
                (None, Some(amount)) => BonusReward::Credits { amount },
                (None, None) => return Err("either --exempt-minutes or --credits is required".into()),
            };
            let task = app.bonus.add_bonus_task(description, reward)?;
            println!("Bonus task created: {}", task.id);
        }
        BonusAction::List => {
            let tasks = app.bonus.list_bonus_tasks()?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        BonusAction::Complete { id } => {
            let completion = app.bonus.complete_bonus_task(&id)?;
            println!("{}", serde_json::to_string_pretty(&completion)?);
        }
        BonusAction::Credits => {
            let report = serde_json::json!({
                "credits": app.bonus.credits()?,
                "active_exemptions": app.bonus.active_exemptions()?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        BonusAction::Redeem { minutes, scope } => {
            let exemption = app
                .bonus
                .redeem_credit(parse_scope(&scope)?, Duration::from_secs(minutes * 60))?;
            println!("{}", serde_json::to_string_pretty(&exemption)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_parse() {
        assert_eq!(parse_scope("all-soft").unwrap(), ExemptionScope::AllSoft);
        assert_eq!(
            parse_scope("category:reading").unwrap(),
            ExemptionScope::Category("reading".into())
        );
        assert_eq!(parse_scope("task:abc").unwrap(), ExemptionScope::Task("abc".into()));
        assert!(parse_scope("task:").is_err());
        assert!(parse_scope("everything").is_err());
    }
}
