//! YAML configuration for template climates
//!
//! Loading resolves the host's custom tags (`!include`, `!secret`,
//! `!env_var`) and then deserializes into [`HostConfig`]. Each climate entry
//! is parsed separately via [`PlatformConfig::climate_configs`], so a
//! malformed entry only costs that one climate.
//!
//! # Example
//!
//! ```ignore
//! use tc_config::load_config;
//!
//! let config = load_config("/config", "configuration.yaml")?;
//! for platform in config.template_platforms() {
//!     for (key, climate) in platform.climate_configs() {
//!         // ...
//!     }
//! }
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, YamlLoader};
pub use schema::{ClimateConfig, HostConfig, PlatformConfig, ScriptConfig, SeedState, PLATFORM};
