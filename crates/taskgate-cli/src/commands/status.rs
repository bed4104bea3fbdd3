use taskgate_core::{App, BlockReason};

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    let verdict = app.engine.evaluate()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }

    let state = if verdict.blocked { "BLOCKED" } else { "allowed" };
    let reason = match &verdict.reason {
        BlockReason::NoPendingTasks => "no pending tasks".to_string(),
        BlockReason::PenaltyActive { until: Some(until) } => format!("penalty until {until}"),
        BlockReason::PenaltyActive { until: None } => "penalty active".to_string(),
        BlockReason::HardTaskOverdue { task_ids } => {
            format!("{} hard task(s) overdue", task_ids.len())
        }
        BlockReason::TaskOverdue { task_ids } => format!("{} task(s) overdue", task_ids.len()),
        BlockReason::Clear => "nothing overdue".to_string(),
    };
    println!("{state}: {reason}");
    Ok(())
}
