//! Load-time entity definitions
//!
//! A [`ClimateEntitySpec`] is built once from configuration, validated, and
//! then shared read-only behind an `Arc`. Reloading builds a new one.

use crate::dispatch::DispatchTables;
use crate::error::{ClimateError, ClimateResult};
use crate::features::{service_feature, ClimateEntityFeature, DispatchKind};
use crate::resolver;
use indexmap::IndexMap;
use serde_json::Value;
use tc_config::{ClimateConfig, ScriptConfig};
use tc_core::{EntityId, CLIMATE_DOMAIN};
use tc_script::ActionSequence;
use tc_template::TemplateInterpreter;
use tracing::debug;

/// Reserved attribute name of the primary state
pub const STATE_ATTRIBUTE: &str = "state";

/// One declared variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub template: Value,
}

/// Immutable definition of one template climate
#[derive(Debug, Clone)]
pub struct ClimateEntitySpec {
    entity_id: EntityId,
    unique_id: String,
    friendly_name: Value,
    device_class: Option<String>,
    icon: Option<Value>,
    temperature_unit: Option<String>,
    state: Option<Value>,
    availability: Option<Value>,
    attributes: IndexMap<String, Value>,
    variables: Vec<VariableDecl>,
    base_entity: Option<EntityId>,
    dispatch: DispatchTables,
}

impl ClimateEntitySpec {
    /// Build and validate a spec for the climate configured under `key`
    ///
    /// `globals` are the platform block's shared variables; they are
    /// declared before the entity's own.
    pub fn from_config(
        key: &str,
        config: &ClimateConfig,
        globals: &IndexMap<String, Value>,
        templates: &dyn TemplateInterpreter,
    ) -> ClimateResult<Self> {
        let entity_id =
            EntityId::climate(key).map_err(|e| ClimateError::configuration(key, e))?;
        let entity = entity_id.to_string();

        let base_entity = match &config.base_climate_entity_id {
            Some(raw) => Some(parse_base(&entity_id, raw)?),
            None => None,
        };

        let variables: Vec<VariableDecl> = globals
            .iter()
            .chain(config.variables.iter())
            .map(|(name, template)| VariableDecl {
                name: name.clone(),
                template: template.clone(),
            })
            .collect();
        validate_variables(&entity, &variables, templates)?;

        if config.attributes.contains_key(STATE_ATTRIBUTE) {
            return Err(ClimateError::configuration(
                &entity,
                "attributes may not define 'state'; use the state option",
            ));
        }

        let spec = Self {
            unique_id: config.unique_id.clone().unwrap_or_else(|| key.to_string()),
            friendly_name: Value::String(
                config.friendly_name.clone().unwrap_or_else(|| key.to_string()),
            ),
            device_class: config.device_class.clone(),
            icon: config.icon.clone().map(Value::String),
            temperature_unit: config.temperature_unit.clone(),
            state: config.state.clone().map(Value::String),
            availability: config.availability.clone().map(Value::String),
            attributes: config.attributes.clone(),
            variables,
            base_entity,
            dispatch: compile_tables(&entity, config)?,
            entity_id,
        };
        spec.validate_templates(templates)?;

        debug!(
            entity_id = %spec.entity_id,
            base = ?spec.base_entity.as_ref().map(ToString::to_string),
            variables = spec.variables.len(),
            "Loaded template climate"
        );
        Ok(spec)
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn friendly_name(&self) -> &Value {
        &self.friendly_name
    }

    pub fn device_class(&self) -> Option<&str> {
        self.device_class.as_deref()
    }

    pub fn icon(&self) -> Option<&Value> {
        self.icon.as_ref()
    }

    pub fn temperature_unit(&self) -> Option<&str> {
        self.temperature_unit.as_deref()
    }

    pub fn availability(&self) -> Option<&Value> {
        self.availability.as_ref()
    }

    /// Template of a named attribute; `"state"` addresses the primary state
    pub fn template(&self, name: &str) -> Option<&Value> {
        if name == STATE_ATTRIBUTE {
            self.state.as_ref()
        } else {
            self.attributes.get(name)
        }
    }

    /// Names of the locally templated attributes, in declaration order
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Declared variables in evaluation order
    pub fn variables(&self) -> &[VariableDecl] {
        &self.variables
    }

    pub fn base_entity(&self) -> Option<&EntityId> {
        self.base_entity.as_ref()
    }

    pub fn dispatch(&self) -> &DispatchTables {
        &self.dispatch
    }

    /// Features this entity implements itself
    pub fn local_features(&self) -> ClimateEntityFeature {
        let mut features = ClimateEntityFeature::empty();
        for service in self.dispatch.keys(DispatchKind::Service) {
            if let Some(feature) = service_feature(service) {
                features |= feature;
            }
        }
        for kind in DispatchKind::MODES {
            if self.dispatch.has_any(kind) {
                features |= kind.feature();
            }
        }
        features
    }

    /// Reject templates that do not parse
    fn validate_templates(&self, templates: &dyn TemplateInterpreter) -> ClimateResult<()> {
        let named = [
            ("state", self.state.as_ref()),
            ("availability", self.availability.as_ref()),
            ("friendly_name", Some(&self.friendly_name)),
            ("icon", self.icon.as_ref()),
        ];
        let attributes = self.attributes.iter().map(|(k, v)| (k.as_str(), Some(v)));

        for (name, template) in named.into_iter().chain(attributes) {
            if let Some(template) = template {
                resolver::referenced_names(templates, template).map_err(|e| {
                    ClimateError::configuration(
                        self.entity_id.to_string(),
                        format!("template for '{name}' is invalid: {e}"),
                    )
                })?;
            }
        }
        Ok(())
    }
}

fn parse_base(own: &EntityId, raw: &str) -> ClimateResult<EntityId> {
    let base: EntityId = raw
        .parse()
        .map_err(|e| ClimateError::configuration(own.to_string(), format!("base_climate_entity_id: {e}")))?;
    if base.domain() != CLIMATE_DOMAIN {
        return Err(ClimateError::configuration(
            own.to_string(),
            format!("base_climate_entity_id must be a climate entity, got {base}"),
        ));
    }
    if &base == own {
        return Err(ClimateError::configuration(
            own.to_string(),
            "an entity cannot be its own base",
        ));
    }
    Ok(base)
}

/// Check that every variable only reads variables declared before it
///
/// A name counts as a forward reference when it is declared at or after the
/// referencing position and nowhere earlier. Names that are never declared
/// are left alone: they may be invocation parameters.
fn validate_variables(
    entity: &str,
    variables: &[VariableDecl],
    templates: &dyn TemplateInterpreter,
) -> ClimateResult<()> {
    for (index, decl) in variables.iter().enumerate() {
        let names = resolver::referenced_names(templates, &decl.template).map_err(|e| {
            ClimateError::configuration(entity, format!("variable '{}' is invalid: {e}", decl.name))
        })?;

        let (earlier, later) = variables.split_at(index);
        for name in &names {
            let declared_earlier = earlier.iter().any(|d| &d.name == name);
            let declared_later = later.iter().any(|d| &d.name == name);
            if declared_later && !declared_earlier {
                return Err(ClimateError::configuration(
                    entity,
                    format!(
                        "variable '{}' references '{name}' before it is declared",
                        decl.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn compile_tables(entity: &str, config: &ClimateConfig) -> ClimateResult<DispatchTables> {
    let tables: [(DispatchKind, &IndexMap<String, ScriptConfig>); 6] = [
        (DispatchKind::Service, &config.service_scripts),
        (DispatchKind::HvacMode, &config.hvac_mode_scripts),
        (DispatchKind::PresetMode, &config.preset_mode_scripts),
        (DispatchKind::FanMode, &config.fan_mode_scripts),
        (DispatchKind::SwingMode, &config.swing_mode_scripts),
        (DispatchKind::SwingHorizontalMode, &config.swing_horizontal_mode_scripts),
    ];

    let mut dispatch = DispatchTables::default();
    for (kind, scripts) in tables {
        for (key, script) in scripts {
            let sequence = ActionSequence::from_config(script).map_err(|e| {
                ClimateError::configuration(entity, format!("{kind}_scripts.{key}: {e}"))
            })?;
            dispatch.insert(kind, key.clone(), sequence);
        }
    }
    Ok(dispatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tc_state_store::StateStore;
    use tc_template::TemplateEngine;

    fn engine() -> TemplateEngine {
        TemplateEngine::new(Arc::new(StateStore::new()))
    }

    fn config(raw: Value) -> ClimateConfig {
        ClimateConfig::from_value("test", raw).unwrap()
    }

    fn load(raw: Value) -> ClimateResult<ClimateEntitySpec> {
        ClimateEntitySpec::from_config("office", &config(raw), &IndexMap::new(), &engine())
    }

    #[test]
    fn test_defaults() {
        let spec = load(json!({})).unwrap();
        assert_eq!(spec.entity_id().to_string(), "climate.office");
        assert_eq!(spec.unique_id(), "office");
        assert_eq!(spec.friendly_name(), &json!("office"));
        assert!(spec.base_entity().is_none());
        assert!(spec.template(STATE_ATTRIBUTE).is_none());
        assert_eq!(spec.local_features(), ClimateEntityFeature::empty());
    }

    #[test]
    fn test_variables_in_order() {
        let mut globals = IndexMap::new();
        globals.insert("a".to_string(), json!(1));
        let spec = ClimateEntitySpec::from_config(
            "office",
            &config(json!({"variables": {"b": "{{ a + 1 }}", "a": "{{ a * 10 }}"}})),
            &globals,
            &engine(),
        )
        .unwrap();

        let names: Vec<_> = spec.variables().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_forward_reference_is_rejected() {
        let err = load(json!({"variables": {"b": "{{ a }}", "a": 1}})).unwrap_err();
        assert!(matches!(err, ClimateError::Configuration { ref reason, .. } if reason.contains("'a'")));
    }

    #[test]
    fn test_self_reference_is_rejected() {
        let err = load(json!({"variables": {"a": "{{ a + 1 }}"}})).unwrap_err();
        assert!(matches!(err, ClimateError::Configuration { .. }));
    }

    #[test]
    fn test_undeclared_names_are_allowed() {
        // hvac_mode is bound at invocation time
        assert!(load(json!({"variables": {"mode": "{{ hvac_mode }}"}})).is_ok());
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let err = load(json!({"state": "{{ 'heat' "})).unwrap_err();
        assert!(matches!(err, ClimateError::Configuration { ref reason, .. } if reason.contains("state")));
    }

    #[test]
    fn test_invalid_script_is_rejected() {
        let err = load(json!({"hvac_mode_scripts": {"heat": [{"bogus": 1}]}})).unwrap_err();
        assert!(matches!(err, ClimateError::Configuration { ref reason, .. } if reason.contains("hvac_mode_scripts.heat")));
    }

    #[test]
    fn test_base_entity_validation() {
        let spec = load(json!({"base_climate_entity_id": "climate.real"})).unwrap();
        assert_eq!(spec.base_entity().map(ToString::to_string).as_deref(), Some("climate.real"));

        assert!(load(json!({"base_climate_entity_id": "switch.real"})).is_err());
        assert!(load(json!({"base_climate_entity_id": "not an id"})).is_err());
        assert!(load(json!({"base_climate_entity_id": "climate.office"})).is_err());
    }

    #[test]
    fn test_state_is_reserved_in_attributes() {
        assert!(load(json!({"attributes": {"state": "heat"}})).is_err());
    }

    #[test]
    fn test_local_features() {
        let spec = load(json!({
            "service_scripts": {"turn_on": [], "set_temperature": [], "calibrate": []},
            "preset_mode_scripts": {"eco": []},
            "hvac_mode_scripts": {"heat": []}
        }))
        .unwrap();

        assert_eq!(
            spec.local_features(),
            ClimateEntityFeature::TURN_ON
                | ClimateEntityFeature::TARGET_TEMPERATURE
                | ClimateEntityFeature::PRESET_MODE
        );
    }
}
