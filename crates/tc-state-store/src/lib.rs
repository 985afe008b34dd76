//! In-memory entity state store
//!
//! The [`StateStore`] holds the current state of every entity the host
//! knows about. It is the live-state collaborator the template engine and
//! the base-entity fallback read from: every read goes straight to the map,
//! so callers always observe the latest write.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use tc_core::{Context, EntityId, LiveState, State};
use tracing::{debug, instrument};

/// Concurrent map of entity states keyed by entity_id string
pub struct StateStore {
    states: DashMap<String, State>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Write the state of an entity
    ///
    /// An existing entity keeps its `last_changed` timestamp when only the
    /// attributes changed. The entry stays locked from read to write.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let new_state = match self.states.entry(entity_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let updated = entry.get().with_update(state, attributes, context);
                entry.insert(updated.clone());
                updated
            }
            Entry::Vacant(entry) => {
                let created = State::new(entity_id, state, attributes, context);
                entry.insert(created.clone());
                created
            }
        };

        debug!(state = %new_state.state, "Setting entity state");
        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// The state value alone, or None if the entity doesn't exist
    pub fn get_state_value(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state_value(entity_id).as_deref() == Some(state)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveState for StateStore {
    fn get_state(&self, entity_id: &str) -> Option<State> {
        self.get(entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> EntityId {
        s.parse().unwrap()
    }

    #[test]
    fn test_set_and_get_state() {
        let store = StateStore::new();
        let attrs = HashMap::from([("current_temperature".to_string(), json!(19.5))]);

        let state = store.set(id("climate.base"), "heat", attrs.clone(), Context::new());
        assert_eq!(state.state, "heat");
        assert_eq!(state.attributes, attrs);

        let read = store.get("climate.base").unwrap();
        assert_eq!(read.state, "heat");
        assert!(store.is_state("climate.base", "heat"));
        assert!(!store.is_state("climate.missing", "heat"));
    }

    #[test]
    fn test_live_state_reads_latest_write() {
        let store = StateStore::new();
        store.set(id("switch.heater"), "off", HashMap::new(), Context::new());
        let live: &dyn LiveState = &store;
        assert_eq!(live.get_attribute("switch.heater", "state"), Some(json!("off")));

        store.set(id("switch.heater"), "on", HashMap::new(), Context::new());
        assert_eq!(live.get_attribute("switch.heater", "state"), Some(json!("on")));
        assert_eq!(live.get_attribute("switch.heater", "power"), None);
        assert_eq!(live.get_attribute("switch.nothing", "state"), None);
    }

    #[test]
    fn test_update_keeps_last_changed_for_attribute_writes() {
        let store = StateStore::new();
        let entity = id("climate.base");
        let first = store.set(entity.clone(), "cool", HashMap::new(), Context::new());

        let attrs = HashMap::from([("temperature".to_string(), json!(20))]);
        let updated = store.set(entity.clone(), "cool", attrs, Context::new());
        assert_eq!(updated.last_changed, first.last_changed);
        assert_eq!(updated.attributes.get("temperature"), Some(&json!(20)));

        let changed = store.set(entity, "heat", HashMap::new(), Context::new());
        assert!(changed.last_changed >= first.last_changed);
        assert_eq!(store.get("climate.base").unwrap().state, "heat");
    }

    #[test]
    fn test_concurrent_writers() {
        let store = StateStore::new();
        std::thread::scope(|scope| {
            for n in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    store.set(id("sensor.shared"), n.to_string(), HashMap::new(), Context::new());
                });
            }
        });
        let state = store.get("sensor.shared").unwrap();
        assert!(state.state.parse::<u32>().unwrap() < 8);
    }
}
