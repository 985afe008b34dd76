//! Template evaluation for template climates
//!
//! Templates are Jinja2 text evaluated against a set of variable bindings
//! plus the host's live entity state. The climate core only sees the
//! [`TemplateInterpreter`] contract; [`TemplateEngine`] is the minijinja
//! implementation the host wires in.
//!
//! # State Access
//!
//! - `states('entity_id')` - Get entity state as string
//! - `states.climate.living_room` - Access state object
//! - `is_state('entity_id', 'on')` - Check if entity is in state (or any of a list)
//! - `state_attr('entity_id', 'temperature')` - Get attribute value
//! - `is_state_attr('entity_id', 'hvac_action', 'heating')`
//! - `has_value('entity_id')` - Entity exists and is not unknown/unavailable
//!
//! # Filters
//!
//! - `| float` / `| int` / `| bool` - Type conversion with optional default
//! - `| round(1)` - Round to precision
//!
//! # Example
//!
//! ```ignore
//! use tc_template::{Bindings, TemplateEngine, TemplateInterpreter};
//!
//! let engine = TemplateEngine::new(live_state);
//! let value = engine.evaluate(
//!     "{{ state_attr('climate.base', attribute) }}",
//!     &Bindings::from_iter([("attribute".into(), "temperature".into())]),
//! )?;
//! ```

mod engine;
mod error;
mod filters;
mod states;

pub use engine::TemplateEngine;
pub use error::{TemplateError, TemplateResult};
pub use states::StatesObject;

use std::collections::BTreeSet;

/// Variable bindings visible to a single evaluation
pub type Bindings = serde_json::Map<String, serde_json::Value>;

/// Evaluates template text against bindings
///
/// Implementations are pure with respect to their inputs: no caching
/// across calls, no side effects. Live state is read at evaluation time.
pub trait TemplateInterpreter: Send + Sync {
    /// Evaluate `text` with `bindings` in scope and return the typed result
    fn evaluate(&self, text: &str, bindings: &Bindings) -> TemplateResult<serde_json::Value>;

    /// Names `text` reads from its environment without declaring them
    ///
    /// Used at load time to reject variable declarations that refer to
    /// later ones. Fails when `text` does not parse.
    fn referenced_names(&self, text: &str) -> TemplateResult<BTreeSet<String>>;
}

/// Whether a string contains template syntax at all
pub fn is_template(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}
