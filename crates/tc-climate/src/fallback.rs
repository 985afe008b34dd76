//! Single-hop delegation to a base climate entity

use crate::attributes::AttributeValue;
use crate::error::{ClimateError, ClimateResult};
use crate::features::{ClimateEntityFeature, DispatchKind};
use serde_json::Value;
use std::collections::BTreeMap;
use tc_core::{Context, EntityId, LiveState, ServiceCall, ServiceDispatcher, CLIMATE_DOMAIN};
use tc_template::Bindings;
use tracing::{debug, warn};

/// What the base entity advertised when it was last read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseCapabilities {
    features: ClimateEntityFeature,
    modes: BTreeMap<DispatchKind, Vec<String>>,
}

impl BaseCapabilities {
    pub fn new(
        features: ClimateEntityFeature,
        modes: impl IntoIterator<Item = (DispatchKind, Vec<String>)>,
    ) -> Self {
        Self {
            features,
            modes: modes.into_iter().collect(),
        }
    }

    /// Read `supported_features` and the mode lists of `base`
    ///
    /// A base that does not exist yet has no capabilities.
    pub fn read(live: &dyn LiveState, base: &EntityId) -> Self {
        let Some(state) = live.get_state(&base.to_string()) else {
            warn!(base = %base, "Base entity not found; no capabilities inherited");
            return Self::default();
        };

        let features = state
            .attribute::<u32>("supported_features")
            .map(ClimateEntityFeature::from_bits)
            .unwrap_or_default();

        let modes = DispatchKind::MODES.into_iter().filter_map(|kind| {
            let list = state.attributes.get(kind.list_attribute()?)?.as_array()?;
            let keys = list.iter().filter_map(|m| m.as_str().map(str::to_string)).collect();
            Some((kind, keys))
        });

        let capabilities = Self::new(features, modes);
        debug!(base = %base, features = capabilities.features.bits(), "Read base capabilities");
        capabilities
    }

    pub fn features(&self) -> ClimateEntityFeature {
        self.features
    }

    /// Keys of one mode kind, in the base's order
    pub fn modes(&self, kind: DispatchKind) -> &[String] {
        self.modes.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether the base can take `kind`/`key`
    ///
    /// Services without a feature flag count as supported.
    pub fn supports(&self, kind: DispatchKind, key: &str) -> bool {
        match kind {
            DispatchKind::Service => match service_requirement(key) {
                Some(required) => self.features.intersects(required),
                None => true,
            },
            mode => self.modes(mode).iter().any(|m| m == key),
        }
    }
}

/// Feature flags of which at least one must be set for a base to take `service`
fn service_requirement(service: &str) -> Option<ClimateEntityFeature> {
    let required = match service {
        "turn_on" => ClimateEntityFeature::TURN_ON,
        "turn_off" => ClimateEntityFeature::TURN_OFF,
        "set_temperature" => {
            ClimateEntityFeature::TARGET_TEMPERATURE | ClimateEntityFeature::TARGET_TEMPERATURE_RANGE
        }
        "set_humidity" => ClimateEntityFeature::TARGET_HUMIDITY,
        "set_fan_mode" => ClimateEntityFeature::FAN_MODE,
        "set_preset_mode" => ClimateEntityFeature::PRESET_MODE,
        "set_swing_mode" => ClimateEntityFeature::SWING_MODE,
        "set_swing_horizontal_mode" => ClimateEntityFeature::SWING_HORIZONTAL_MODE,
        _ => return None,
    };
    Some(required)
}

/// Read `name` from the base; `"state"` is its state value
pub fn delegate_read(live: &dyn LiveState, base: &EntityId, name: &str) -> AttributeValue {
    match live.get_attribute(&base.to_string(), name) {
        Some(value) => AttributeValue::Value(value),
        None => AttributeValue::Unavailable,
    }
}

/// Forward a command to the matching climate service of the base
pub async fn delegate_dispatch(
    services: &dyn ServiceDispatcher,
    base: &EntityId,
    kind: DispatchKind,
    key: &str,
    params: &Bindings,
    context: Context,
) -> ClimateResult<()> {
    let mut data = Bindings::new();
    let service = match kind.setter_service() {
        Some(setter) => {
            data.insert(kind.as_str().to_string(), Value::String(key.to_string()));
            setter
        }
        None => {
            data.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
            key.to_string()
        }
    };
    data.insert("entity_id".to_string(), Value::String(base.to_string()));

    debug!(base = %base, %service, "Delegating to base entity");
    let call = ServiceCall::new(CLIMATE_DOMAIN, service, Value::Object(data), context);
    services
        .invoke(call)
        .await
        .map(|_| ())
        .map_err(|cause| ClimateError::Delegation {
            entity_id: base.to_string(),
            cause,
        })
}
