//! Template climate entities
//!
//! A template climate is a virtual climate entity defined entirely in
//! configuration:
//!
//! - **Reads** resolve templates against live state ([`ClimateEntity::poll`])
//! - **Writes** run user scripts per service or mode ([`ClimateEntity::invoke`])
//! - **Fallback** hands anything not defined locally to an optional base
//!   climate entity, one hop only
//!
//! The crate only depends on collaborator traits: [`tc_core::LiveState`],
//! [`tc_core::ServiceDispatcher`] and [`tc_template::TemplateInterpreter`].
//! The host supplies them through a [`Host`].
//!
//! # Example
//!
//! ```ignore
//! use tc_climate::{setup, Host};
//!
//! let host = Host::new(states, templates, services);
//! let platform = setup(&platform_config, &host);
//! for entity in &platform.entities {
//!     let snapshot = entity.poll();
//!     println!("{} = {}", snapshot.entity_id, snapshot.state_string());
//! }
//! platform.entities[0].set_hvac_mode("heat").await?;
//! ```

mod attributes;
mod context;
mod dispatch;
mod entity;
mod error;
mod fallback;
mod features;
mod platform;
mod resolver;
mod spec;

pub use attributes::{read_attribute, AttributeValue};
pub use context::{build as build_context, EvaluationContext, EvaluationCycle, ATTRIBUTE_BINDING, BASE_ENTITY_BINDING};
pub use dispatch::{route, CommandStatus, DispatchOutcome, DispatchTables};
pub use entity::{ClimateEntity, ClimateSnapshot, TemperatureRequest};
pub use error::{ClimateError, ClimateResult};
pub use fallback::{delegate_dispatch, delegate_read, BaseCapabilities};
pub use features::{service_feature, ClimateEntityFeature, DispatchKind};
pub use platform::{reload, setup, Host, PlatformSetup};
pub use resolver::{referenced_names, resolve, resolve_optional};
pub use spec::{ClimateEntitySpec, VariableDecl, STATE_ATTRIBUTE};
