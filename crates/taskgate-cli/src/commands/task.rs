//! Task management commands for CLI.

use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use taskgate_core::{App, Task};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task title
        title: String,
        /// Deadline as RFC3339 (e.g. 2026-03-01T18:00:00Z)
        #[arg(long, conflicts_with = "minutes")]
        deadline: Option<String>,
        /// Deadline relative to now, in minutes
        #[arg(long, default_value = "60")]
        minutes: i64,
        /// Category, used by category-scoped exemptions
        #[arg(long, default_value = "general")]
        category: String,
        /// Reset every day instead of counting as pending work
        #[arg(long)]
        daily: bool,
        /// Overdue hard tasks block regardless of grace or category exemptions
        #[arg(long)]
        hard: bool,
        /// Sub-step title (repeatable)
        #[arg(long = "step")]
        steps: Vec<String>,
    },
    /// List tasks
    List {
        /// Only incomplete tasks
        #[arg(long)]
        open: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a task complete
    Complete {
        /// Task ID
        id: String,
    },
    /// Reopen a completed task
    Reopen {
        /// Task ID
        id: String,
    },
    /// Mark a sub-step done; finishing the last one completes the task
    Step {
        /// Task ID
        id: String,
        /// Zero-based step index
        index: usize,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
}

fn parse_deadline(raw: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn load(app: &App, id: &str) -> Result<Task, Box<dyn std::error::Error>> {
    app.tasks()
        .get(id)?
        .ok_or_else(|| format!("task not found: {id}").into())
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::open()?;
    let tasks = app.tasks();
    let now = app.clock.now();

    match action {
        TaskAction::Add {
            title,
            deadline,
            minutes,
            category,
            daily,
            hard,
            steps,
        } => {
            let deadline = match deadline {
                Some(raw) => parse_deadline(&raw)?,
                None => now + Duration::minutes(minutes),
            };
            let mut task = Task::new(title, now, deadline)
                .with_category(category)
                .with_steps(steps);
            task.is_daily = daily;
            task.is_hard = hard;
            tasks.create(&task)?;
            println!("Task created: {}", task.id);
        }
        TaskAction::List { open, json } => {
            let list = if open {
                tasks.all_incomplete_tasks()?
            } else {
                tasks.list()?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                for task in &list {
                    let mark = if task.completed { "x" } else { " " };
                    let mut flags = Vec::new();
                    if task.is_daily {
                        flags.push("daily");
                    }
                    if task.is_hard {
                        flags.push("hard");
                    }
                    if task.is_overdue(now) {
                        flags.push("OVERDUE");
                    }
                    println!(
                        "[{mark}] {}  {}  due {}  {}",
                        task.id,
                        task.title,
                        task.deadline.format("%Y-%m-%d %H:%M"),
                        flags.join(",")
                    );
                }
            }
        }
        TaskAction::Complete { id } => {
            let mut task = load(&app, &id)?;
            task.complete(now);
            tasks.update(&task)?;
            println!("Task completed: {id}");
        }
        TaskAction::Reopen { id } => {
            let mut task = load(&app, &id)?;
            task.reopen();
            tasks.update(&task)?;
            println!("Task reopened: {id}");
        }
        TaskAction::Step { id, index } => {
            let mut task = load(&app, &id)?;
            let finished = task.complete_step(index, now)?;
            tasks.update(&task)?;
            if finished {
                println!("Task completed: {id}");
            } else {
                println!("Step {index} done");
            }
        }
        TaskAction::Delete { id } => {
            if tasks.delete(&id)? {
                println!("Task deleted: {id}");
            } else {
                return Err(format!("task not found: {id}").into());
            }
        }
    }
    Ok(())
}
