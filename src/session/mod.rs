//! Stateful session over the wallet pipelines
//!
//! - [`orchestrator`] - the [`SessionOrchestrator`] façade
//! - [`guard`] - the single in-flight action slot
//! - [`state`] - session state and its read-only snapshot

mod guard;
mod orchestrator;
mod state;

pub use guard::ActionKind;
pub use orchestrator::{SessionOrchestrator, VoteOutcome};
pub use state::{SessionPhase, SessionSnapshot};
