//! State-backed device services
//!
//! Handlers here behave like simple physical devices: a call rewrites the
//! targeted entities in the state store and nothing else. They stand in for
//! real integrations in the host binary and as the base climate in tests.

use crate::{ServiceDescription, ServiceRegistry};
use serde_json::Value;
use std::sync::Arc;
use tc_core::{EntityId, ServiceCall, ServiceError, ServiceResult, CLIMATE_DOMAIN};
use tc_state_store::StateStore;
use tracing::info;

/// Register `switch.turn_on`, `switch.turn_off` and `switch.toggle`
pub fn register_switch_services(services: &ServiceRegistry, states: Arc<StateStore>) {
    const DOMAIN: &str = "switch";

    for service in ["turn_on", "turn_off", "toggle"] {
        let states = states.clone();
        services.register(
            ServiceDescription::new(DOMAIN, service),
            move |call: ServiceCall| {
                let states = states.clone();
                async move {
                    for entity_id in target_entities(&call, DOMAIN) {
                        if let Some(current) = states.get(&entity_id.to_string()) {
                            let new_state = match call.service.as_str() {
                                "turn_on" => "on",
                                "turn_off" => "off",
                                _ if current.state == "on" => "off",
                                _ => "on",
                            };
                            states.set(entity_id, new_state, current.attributes, call.context.clone());
                        }
                    }
                    Ok(None)
                }
            },
        );
    }

    info!("Switch services registered");
}

/// Register the standard climate services against stored climate entities
///
/// Mode setters reject modes missing from the entity's `<kind>_modes`
/// attribute when that attribute is present.
pub fn register_climate_services(services: &ServiceRegistry, states: Arc<StateStore>) {
    const SERVICES: [&str; 10] = [
        "turn_on",
        "turn_off",
        "toggle",
        "set_hvac_mode",
        "set_preset_mode",
        "set_fan_mode",
        "set_swing_mode",
        "set_swing_horizontal_mode",
        "set_temperature",
        "set_humidity",
    ];

    for service in SERVICES {
        let states = states.clone();
        services.register(
            ServiceDescription::new(CLIMATE_DOMAIN, service),
            move |call: ServiceCall| {
                let states = states.clone();
                async move {
                    for entity_id in target_entities(&call, CLIMATE_DOMAIN) {
                        apply_climate_call(&states, entity_id, &call)?;
                    }
                    Ok(None)
                }
            },
        );
    }

    info!("Climate services registered");
}

fn apply_climate_call(states: &StateStore, entity_id: EntityId, call: &ServiceCall) -> ServiceResult {
    let Some(current) = states.get(&entity_id.to_string()) else {
        return Ok(None);
    };
    let mut state = current.state.clone();
    let mut attributes = current.attributes.clone();

    match call.service.as_str() {
        "turn_on" => state = on_mode(&current.attributes),
        "turn_off" => state = "off".to_string(),
        "toggle" if state == "off" => state = on_mode(&current.attributes),
        "toggle" => state = "off".to_string(),
        "set_hvac_mode" => state = requested_mode(call, &attributes, "hvac_mode")?,
        "set_temperature" => {
            for key in ["temperature", "target_temp_high", "target_temp_low"] {
                if let Some(value) = call.service_data.get(key) {
                    attributes.insert(key.to_string(), value.clone());
                }
            }
            if call.service_data.get("hvac_mode").is_some() {
                state = requested_mode(call, &attributes, "hvac_mode")?;
            }
        }
        "set_humidity" => {
            let humidity = call
                .service_data
                .get("humidity")
                .cloned()
                .ok_or_else(|| ServiceError::InvalidData("humidity is required".into()))?;
            attributes.insert("humidity".to_string(), humidity);
        }
        other => {
            let kind = other.trim_start_matches("set_");
            let mode = requested_mode(call, &attributes, kind)?;
            attributes.insert(kind.to_string(), Value::String(mode));
        }
    }

    states.set(entity_id, state, attributes, call.context.clone());
    Ok(None)
}

/// First non-off hvac mode the entity advertises
fn on_mode(attributes: &std::collections::HashMap<String, Value>) -> String {
    attributes
        .get("hvac_modes")
        .and_then(Value::as_array)
        .and_then(|modes| modes.iter().filter_map(Value::as_str).find(|m| *m != "off"))
        .unwrap_or("auto")
        .to_string()
}

fn requested_mode(
    call: &ServiceCall,
    attributes: &std::collections::HashMap<String, Value>,
    kind: &str,
) -> Result<String, ServiceError> {
    let mode: String = call
        .get(kind)
        .ok_or_else(|| ServiceError::InvalidData(format!("{kind} is required")))?;

    let allowed = attributes
        .get(&format!("{kind}s"))
        .and_then(Value::as_array);
    if let Some(allowed) = allowed {
        if !allowed.iter().any(|m| m.as_str() == Some(mode.as_str())) {
            return Err(ServiceError::InvalidData(format!(
                "{kind} '{mode}' is not supported"
            )));
        }
    }
    Ok(mode)
}

/// Targeted entities of one domain
fn target_entities(call: &ServiceCall, domain: &str) -> Vec<EntityId> {
    call.entity_ids()
        .into_iter()
        .filter_map(|id| id.parse::<EntityId>().ok())
        .filter(|e| e.domain() == domain)
        .collect()
}
