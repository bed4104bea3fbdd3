pub mod bonus;
pub mod config;
pub mod contributions;
pub mod penalty;
pub mod quest;
pub mod status;
pub mod task;
pub mod worker;
