//! Entity state snapshot

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// The state of an entity at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub entity_id: EntityId,

    /// The state value (e.g. "heat", "off", "23.5", "unavailable")
    pub state: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state was last written, even if unchanged
    pub last_updated: DateTime<Utc>,

    pub context: Context,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Create the successor of this state, keeping `last_changed` when the
    /// value itself did not change
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let last_changed = if self.state == new_state {
            self.last_changed
        } else {
            now
        };

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed,
            last_updated: now,
            context,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Read a named value of this state
    ///
    /// `"state"` yields the state value itself; any other name is looked up
    /// in the attributes.
    pub fn value_of(&self, name: &str) -> Option<serde_json::Value> {
        if name == "state" {
            return Some(serde_json::Value::String(self.state.clone()));
        }
        self.attributes.get(name).cloned()
    }

    /// Get an attribute deserialized into `T`
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are bookkeeping, not identity
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> State {
        State::new(
            "climate.base".parse().unwrap(),
            "heat",
            HashMap::from([
                ("temperature".to_string(), json!(21.5)),
                ("hvac_modes".to_string(), json!(["off", "heat"])),
            ]),
            Context::new(),
        )
    }

    #[test]
    fn test_value_of() {
        let state = sample();
        assert_eq!(state.value_of("state"), Some(json!("heat")));
        assert_eq!(state.value_of("temperature"), Some(json!(21.5)));
        assert_eq!(state.value_of("missing"), None);
    }

    #[test]
    fn test_typed_attribute() {
        let state = sample();
        let modes: Vec<String> = state.attribute("hvac_modes").unwrap();
        assert_eq!(modes, vec!["off", "heat"]);
        assert_eq!(state.attribute::<Vec<String>>("temperature"), None);
    }

    #[test]
    fn test_update_keeps_last_changed_for_same_value() {
        let state = sample();
        let same = state.with_update("heat", HashMap::new(), Context::new());
        assert_eq!(same.last_changed, state.last_changed);

        let changed = state.with_update("off", HashMap::new(), Context::new());
        assert!(changed.last_changed >= state.last_changed);
        assert_eq!(changed.state, "off");
    }
}
