//! Script Engine
//!
//! Scripts are the write side of a template climate: every service or mode
//! a climate handles locally maps to one action sequence.
//!
//! # Step Types
//!
//! - Service calls (`action:` / `service:` with `target` and `data`)
//! - Delays
//! - Conditions (`template`, `state`, or a bare template string)
//! - Variables
//! - `if` / `then` / `else`
//! - `stop`
//!
//! # Key Types
//!
//! - [`ActionSequence`] - compiled, immutable list of [`ActionStep`]s
//! - [`ScriptExecutor`] - runs a sequence against a private context
//! - [`ExecutionResult`] - `Completed`, `Halted` or `Failed` at a step

pub mod action;
mod error;
pub mod executor;

pub use action::{
    parse_duration, ActionConfig, ActionSequence, ActionStep, DelayDuration, DelayUnit,
};
pub use error::{ScriptError, ScriptResult, StepError};
pub use executor::{is_truthy, ExecutionContext, ExecutionResult, ScriptExecutor};
