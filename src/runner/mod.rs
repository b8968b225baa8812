//! Task runner - the step loop and its progress events.
//!
//! - [`Orchestrator`] runs one task: planner call, admission, dispatch, observe
//! - [`RunEvent`] is the optional progress stream for a run

mod events;
mod orchestrator;

pub use events::RunEvent;
pub use orchestrator::Orchestrator;
