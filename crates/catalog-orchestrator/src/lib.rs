pub mod classify;
pub mod contact;
pub mod context;
pub mod process;

pub use context::OrchestratorContext;
pub use process::{process_turn, Reply, DEFAULT_TURN_DEADLINE_SECS, HISTORY_WINDOW};
