//! Capability system - registration, admission and dispatch
//!
//! A capability is a named action with a body that runs either on the
//! blocking pool or as an async task. The dispatcher resolves a planner's
//! step against the registry, evaluates the capability's guard and runs the
//! body under a per-call timeout. Failures come back as observations.

mod capability;
mod context;
mod dispatcher;
mod registry;

pub mod builtin;

pub use builtin::standard_registry;
pub use capability::{ArgumentsExt, AsyncCapability, BlockingCapability, Capability, CapabilityBody, CapabilityInfo, Guard};
pub use context::{CallContext, DEFAULT_MAX_OUTPUT_BYTES, Preflight, ToolFailure};
pub use dispatcher::{DEFAULT_BLOCKING_SLOTS, Dispatcher};
pub use registry::{CapabilityRegistry, fuzzy_match};
