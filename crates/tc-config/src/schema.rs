//! Typed configuration
//!
//! ```yaml
//! states:
//!   switch.heater: { state: "off" }
//! climate:
//!   - platform: template_climate
//!     variables:
//!       target: climate.hallway
//!     climates:
//!       hallway_proxy:
//!         friendly_name: Hallway
//!         base_climate_entity_id: climate.hallway
//!         state: "{{ states(target) }}"
//!         hvac_mode_scripts:
//!           heat:
//!             - action: switch.turn_on
//!               target: { entity_id: switch.heater }
//! ```

use crate::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Platform name that marks a `climate:` block as ours
pub const PLATFORM: &str = "template_climate";

/// A raw script: a list of action mappings
pub type ScriptConfig = Vec<Value>;

/// Whole configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    /// Initial entity states the host seeds its store with
    #[serde(default)]
    pub states: IndexMap<String, SeedState>,

    #[serde(default)]
    pub climate: Vec<PlatformConfig>,
}

impl HostConfig {
    /// Platform blocks that belong to template climates
    pub fn template_platforms(&self) -> impl Iterator<Item = &PlatformConfig> {
        self.climate.iter().filter(|p| p.platform == PLATFORM)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedState {
    pub state: String,

    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// One `platform: template_climate` block
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub platform: String,

    /// Variables shared by every climate in this block
    #[serde(default)]
    pub variables: IndexMap<String, Value>,

    /// Climates keyed by object id, kept raw so one bad entry can't sink the rest
    #[serde(default)]
    pub climates: IndexMap<String, Value>,
}

impl PlatformConfig {
    /// Parse every climate entry on its own
    pub fn climate_configs(&self) -> Vec<(String, ConfigResult<ClimateConfig>)> {
        self.climates
            .iter()
            .map(|(key, raw)| (key.clone(), ClimateConfig::from_value(key, raw.clone())))
            .collect()
    }
}

/// Configuration of a single template climate
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClimateConfig {
    pub unique_id: Option<String>,
    pub friendly_name: Option<String>,
    pub device_class: Option<String>,
    pub icon: Option<String>,
    pub temperature_unit: Option<String>,

    /// Template for the primary state
    pub state: Option<String>,

    /// Template; the entity is unavailable while this resolves falsy
    pub availability: Option<String>,

    #[serde(default)]
    pub attributes: IndexMap<String, Value>,

    #[serde(default)]
    pub variables: IndexMap<String, Value>,

    pub base_climate_entity_id: Option<String>,

    #[serde(default)]
    pub service_scripts: IndexMap<String, ScriptConfig>,
    #[serde(default)]
    pub hvac_mode_scripts: IndexMap<String, ScriptConfig>,
    #[serde(default)]
    pub preset_mode_scripts: IndexMap<String, ScriptConfig>,
    #[serde(default)]
    pub fan_mode_scripts: IndexMap<String, ScriptConfig>,
    #[serde(default)]
    pub swing_mode_scripts: IndexMap<String, ScriptConfig>,
    #[serde(default)]
    pub swing_horizontal_mode_scripts: IndexMap<String, ScriptConfig>,
}

impl ClimateConfig {
    pub fn from_value(key: &str, raw: Value) -> ConfigResult<Self> {
        if raw.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(raw).map_err(|e| ConfigError::InvalidClimate {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}
