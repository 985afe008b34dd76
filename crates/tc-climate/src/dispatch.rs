//! Mode and service dispatch tables
//!
//! Resolution order for every key: a local script, else the base entity
//! when it supports the key, else unsupported.

use crate::fallback::BaseCapabilities;
use crate::features::DispatchKind;
use crate::spec::ClimateEntitySpec;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use tc_core::EntityId;
use tc_script::ActionSequence;

/// Where a read or command ends up
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome<T> {
    /// Handled locally
    Resolved(T),
    /// Handed to the base entity
    Delegated(EntityId),
    /// Neither local nor base; never advertised
    Unsupported,
}

impl<T> DispatchOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DispatchOutcome<U> {
        match self {
            DispatchOutcome::Resolved(value) => DispatchOutcome::Resolved(f(value)),
            DispatchOutcome::Delegated(base) => DispatchOutcome::Delegated(base),
            DispatchOutcome::Unsupported => DispatchOutcome::Unsupported,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, DispatchOutcome::Unsupported)
    }
}

/// Successful end of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The local script ran every step
    Completed,
    /// The local script stopped early without an error
    Halted { reason: String },
    /// The base entity accepted the command
    Delegated,
}

/// Local scripts, per kind and key, in configuration order
#[derive(Debug, Clone, Default)]
pub struct DispatchTables {
    tables: BTreeMap<DispatchKind, IndexMap<String, ActionSequence>>,
}

impl DispatchTables {
    pub fn insert(&mut self, kind: DispatchKind, key: impl Into<String>, sequence: ActionSequence) {
        self.tables.entry(kind).or_default().insert(key.into(), sequence);
    }

    pub fn get(&self, kind: DispatchKind, key: &str) -> Option<&ActionSequence> {
        self.tables.get(&kind).and_then(|table| table.get(key))
    }

    pub fn keys(&self, kind: DispatchKind) -> impl Iterator<Item = &str> {
        self.tables
            .get(&kind)
            .into_iter()
            .flat_map(|table| table.keys().map(String::as_str))
    }

    pub fn has_any(&self, kind: DispatchKind) -> bool {
        self.tables.get(&kind).is_some_and(|table| !table.is_empty())
    }
}

/// Decide who handles `kind`/`key` for this entity
pub fn route<'a>(
    spec: &'a ClimateEntitySpec,
    capabilities: &BaseCapabilities,
    kind: DispatchKind,
    key: &str,
) -> DispatchOutcome<&'a ActionSequence> {
    if let Some(sequence) = spec.dispatch().get(kind, key) {
        return DispatchOutcome::Resolved(sequence);
    }
    match spec.base_entity() {
        Some(base) if capabilities.supports(kind, key) => DispatchOutcome::Delegated(base.clone()),
        _ => DispatchOutcome::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ClimateEntityFeature;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::Arc;
    use tc_config::ClimateConfig;
    use tc_state_store::StateStore;
    use tc_template::TemplateEngine;

    fn spec(raw: serde_json::Value) -> ClimateEntitySpec {
        let engine = TemplateEngine::new(Arc::new(StateStore::new()));
        let config = ClimateConfig::from_value("office", raw).unwrap();
        ClimateEntitySpec::from_config("office", &config, &IndexMap::new(), &engine).unwrap()
    }

    #[test]
    fn test_tables_keep_order() {
        let mut tables = DispatchTables::default();
        tables.insert(DispatchKind::PresetMode, "eco", ActionSequence::default());
        tables.insert(DispatchKind::PresetMode, "away", ActionSequence::default());

        assert_eq!(tables.keys(DispatchKind::PresetMode).collect::<Vec<_>>(), vec!["eco", "away"]);
        assert!(tables.has_any(DispatchKind::PresetMode));
        assert!(!tables.has_any(DispatchKind::FanMode));
        assert_eq!(tables.keys(DispatchKind::FanMode).count(), 0);
    }

    #[test]
    fn test_local_without_base() {
        let spec = spec(json!({"hvac_mode_scripts": {"heat": [{"delay": 0}]}}));
        let caps = BaseCapabilities::default();

        assert!(matches!(
            route(&spec, &caps, DispatchKind::HvacMode, "heat"),
            DispatchOutcome::Resolved(seq) if seq.len() == 1
        ));
        assert!(route(&spec, &caps, DispatchKind::HvacMode, "cool").is_unsupported());
    }

    #[test]
    fn test_delegation_needs_capability() {
        let spec = spec(json!({"base_climate_entity_id": "climate.real"}));
        let caps = BaseCapabilities::new(
            ClimateEntityFeature::TURN_ON,
            [(DispatchKind::HvacMode, vec!["off".to_string(), "cool".to_string()])],
        );
        let base: EntityId = "climate.real".parse().unwrap();

        assert_eq!(
            route(&spec, &caps, DispatchKind::HvacMode, "cool"),
            DispatchOutcome::Delegated(base.clone())
        );
        assert_eq!(
            route(&spec, &caps, DispatchKind::Service, "turn_on"),
            DispatchOutcome::Delegated(base.clone())
        );
        assert_eq!(
            route(&spec, &caps, DispatchKind::Service, "toggle"),
            DispatchOutcome::Delegated(base)
        );
        assert!(route(&spec, &caps, DispatchKind::HvacMode, "heat").is_unsupported());
        assert!(route(&spec, &caps, DispatchKind::Service, "turn_off").is_unsupported());
    }

    #[test]
    fn test_local_wins_over_base() {
        let spec = spec(json!({
            "base_climate_entity_id": "climate.real",
            "service_scripts": {"turn_on": []}
        }));
        let caps = BaseCapabilities::new(ClimateEntityFeature::TURN_ON, []);

        assert!(matches!(
            route(&spec, &caps, DispatchKind::Service, "turn_on"),
            DispatchOutcome::Resolved(_)
        ));
    }

    #[test]
    fn test_outcome_map() {
        let outcome: DispatchOutcome<u8> = DispatchOutcome::Resolved(2);
        assert_eq!(outcome.map(|v| v * 2), DispatchOutcome::Resolved(4));
        assert!(DispatchOutcome::<u8>::Unsupported.map(|v| v + 1).is_unsupported());
    }
}
