//! Deskpilot - guarded execution core for desktop automation agents
//!
//! A planner proposes one capability call at a time; the orchestrator gates
//! it, the dispatcher runs it under a deadline, and every mutating file
//! operation is journaled so it can be undone.

pub mod domain;
pub mod error;
pub mod guardrail;
pub mod id;
pub mod journal;
pub mod planner;
pub mod runner;
pub mod tools;

pub use error::{PilotError, Result};
