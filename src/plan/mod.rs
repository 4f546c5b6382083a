pub mod events;
pub mod executor;
pub mod loop_;
pub mod planner;
pub mod state;
pub mod synthesizer;

pub use events::{emit, SessionEvent};
pub use executor::{Executor, StepOutcome};
pub use loop_::{run_session, LoopConfig, Phase, SessionReport, SessionStatus, TraceEntry};
pub use planner::{parse_decision, Planner, PlannerDecision, ToolCallReq};
pub use state::SessionState;
pub use synthesizer::synthesize;
