pub mod error;
pub mod recovery;
pub mod scheduler;

pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use scheduler::ToolScheduler;
