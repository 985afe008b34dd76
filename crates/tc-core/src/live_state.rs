//! Read-only view of the host's current entity states

use crate::State;

/// Source of current entity states
///
/// Implemented by the host's state store. Templates read through it on
/// every evaluation, so implementations must return the current value and
/// never a cached snapshot.
pub trait LiveState: Send + Sync {
    /// Current state of an entity, or `None` if the entity does not exist
    fn get_state(&self, entity_id: &str) -> Option<State>;

    /// One named value of an entity (`"state"` or an attribute name)
    fn get_attribute(&self, entity_id: &str, name: &str) -> Option<serde_json::Value> {
        self.get_state(entity_id).and_then(|s| s.value_of(name))
    }
}
