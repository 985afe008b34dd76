//! Core types for the template climate platform
//!
//! This crate holds the vocabulary every other crate speaks: entity ids,
//! entity states, call contexts and service calls. It also defines the two
//! host collaborator contracts the climate core consumes:
//!
//! - [`LiveState`] - read-only access to current entity states
//! - [`ServiceDispatcher`] - performs service calls against the host

mod context;
mod entity_id;
mod live_state;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use live_state::LiveState;
pub use service_call::{ServiceCall, ServiceDispatcher, ServiceError, ServiceResult};
pub use state::State;

/// State value reported when an entity cannot currently be read
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value reported when an entity's state is not known
pub const STATE_UNKNOWN: &str = "unknown";

/// Domain every synthesized entity lives in
pub const CLIMATE_DOMAIN: &str = "climate";
