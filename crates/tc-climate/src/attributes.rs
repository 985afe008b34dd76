//! Attribute table: templated attributes and the primary state

use crate::context::EvaluationCycle;
use crate::dispatch::DispatchOutcome;
use crate::error::ClimateResult;
use crate::resolver;
use crate::spec::ClimateEntitySpec;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tc_core::STATE_UNAVAILABLE;
use tc_template::TemplateInterpreter;

/// A public attribute value, or the marker for one that failed this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Value(Value),
    Unavailable,
}

impl AttributeValue {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AttributeValue::Unavailable)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            AttributeValue::Value(value) => Some(value),
            AttributeValue::Unavailable => None,
        }
    }

    /// Value as published to the state store
    pub fn into_value(self) -> Value {
        match self {
            AttributeValue::Value(value) => value,
            AttributeValue::Unavailable => Value::String(STATE_UNAVAILABLE.to_string()),
        }
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        AttributeValue::Value(value)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttributeValue::Value(value) => value.serialize(serializer),
            AttributeValue::Unavailable => serializer.serialize_str(STATE_UNAVAILABLE),
        }
    }
}

/// Resolve `name` within `cycle`
///
/// The template sees `attribute` bound to `name`. Without a local template
/// the read goes to the base entity, if there is one.
pub fn read_attribute(
    spec: &ClimateEntitySpec,
    templates: &dyn TemplateInterpreter,
    cycle: &EvaluationCycle,
    name: &str,
) -> DispatchOutcome<ClimateResult<Value>> {
    match spec.template(name) {
        Some(template) => DispatchOutcome::Resolved(resolve_in_cycle(templates, cycle, name, template)),
        None => match spec.base_entity() {
            Some(base) => DispatchOutcome::Delegated(base.clone()),
            None => DispatchOutcome::Unsupported,
        },
    }
}

/// Resolve `template` as attribute `name` of `cycle`
///
/// Literals need no bindings and resolve even when the cycle's variables
/// failed.
pub(crate) fn resolve_in_cycle(
    templates: &dyn TemplateInterpreter,
    cycle: &EvaluationCycle,
    name: &str,
    template: &Value,
) -> ClimateResult<Value> {
    if resolver::is_literal(template) {
        return Ok(template.clone());
    }
    let context = cycle.context_for(name)?;
    Ok(resolver::resolve(templates, template, context.bindings())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClimateError;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tc_config::ClimateConfig;
    use tc_core::Context;
    use tc_state_store::StateStore;
    use tc_template::{Bindings, TemplateEngine};

    fn fixture(raw: Value) -> (TemplateEngine, ClimateEntitySpec) {
        let store = Arc::new(StateStore::new());
        store.set(
            "switch.x".parse().unwrap(),
            "on",
            HashMap::new(),
            Context::new(),
        );
        let engine = TemplateEngine::new(store);
        let config = ClimateConfig::from_value("office", raw).unwrap();
        let spec = ClimateEntitySpec::from_config("office", &config, &IndexMap::new(), &engine).unwrap();
        (engine, spec)
    }

    #[test]
    fn test_state_template_reads_live_state() {
        let (engine, spec) = fixture(json!({
            "state": "{{ 'on' if is_state('switch.x', 'on') else 'off' }}"
        }));
        let cycle = EvaluationCycle::begin(&spec, &engine, &Bindings::new());

        match read_attribute(&spec, &engine, &cycle, "state") {
            DispatchOutcome::Resolved(Ok(value)) => assert_eq!(value, json!("on")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_attribute_binding() {
        let (engine, spec) = fixture(json!({
            "attributes": {"current_temperature": "{{ attribute }}", "humidity": "{{ attribute }}"}
        }));
        let cycle = EvaluationCycle::begin(&spec, &engine, &Bindings::new());

        let read = |name| match read_attribute(&spec, &engine, &cycle, name) {
            DispatchOutcome::Resolved(Ok(value)) => value,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(read("current_temperature"), json!("current_temperature"));
        assert_eq!(read("humidity"), json!("humidity"));
    }

    #[test]
    fn test_missing_attribute() {
        let (engine, spec) = fixture(json!({}));
        let cycle = EvaluationCycle::begin(&spec, &engine, &Bindings::new());
        assert!(read_attribute(&spec, &engine, &cycle, "humidity").is_unsupported());

        let (engine, spec) = fixture(json!({"base_climate_entity_id": "climate.real"}));
        let cycle = EvaluationCycle::begin(&spec, &engine, &Bindings::new());
        assert_eq!(
            read_attribute(&spec, &engine, &cycle, "humidity").map(|_| ()),
            DispatchOutcome::Delegated("climate.real".parse().unwrap())
        );
    }

    #[test]
    fn test_failure_is_local_to_the_attribute() {
        let (engine, spec) = fixture(json!({
            "attributes": {"bad": "{{ 'warm' | float }}", "good": "{{ 21 }}"}
        }));
        let cycle = EvaluationCycle::begin(&spec, &engine, &Bindings::new());

        assert!(matches!(
            read_attribute(&spec, &engine, &cycle, "bad"),
            DispatchOutcome::Resolved(Err(ClimateError::Template(_)))
        ));
        assert!(matches!(
            read_attribute(&spec, &engine, &cycle, "good"),
            DispatchOutcome::Resolved(Ok(v)) if v == json!(21)
        ));
    }

    #[test]
    fn test_literal_survives_variable_failure() {
        let (engine, spec) = fixture(json!({
            "variables": {"v": "{{ 'warm' | float }}"},
            "attributes": {"hvac_action": "idle", "target": "{{ v }}"}
        }));
        let cycle = EvaluationCycle::begin(&spec, &engine, &Bindings::new());

        assert!(matches!(
            read_attribute(&spec, &engine, &cycle, "hvac_action"),
            DispatchOutcome::Resolved(Ok(v)) if v == json!("idle")
        ));
        assert!(matches!(
            read_attribute(&spec, &engine, &cycle, "target"),
            DispatchOutcome::Resolved(Err(ClimateError::VariableResolution { .. }))
        ));
    }

    #[test]
    fn test_serialize_marker() {
        let values = vec![AttributeValue::Value(json!(20.5)), AttributeValue::Unavailable];
        assert_eq!(serde_json::to_value(&values).unwrap(), json!([20.5, "unavailable"]));
    }
}
