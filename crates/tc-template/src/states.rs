//! The `states` object and state helper functions exposed to templates

use minijinja::value::{Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind};
use std::fmt;
use std::sync::Arc;
use tc_core::{LiveState, State};

/// Live-state access for templates
///
/// Supports:
/// - `states('entity_id')` - state value as string
/// - `states['climate.x']` / `states.climate.x` - full state object
#[derive(Clone)]
pub struct StatesObject {
    live: Arc<dyn LiveState>,
}

impl fmt::Debug for StatesObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatesObject").finish_non_exhaustive()
    }
}

impl StatesObject {
    pub fn new(live: Arc<dyn LiveState>) -> Self {
        Self { live }
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.live.get_state(entity_id).map(|s| s.state)
    }

    pub fn is_state(&self, entity_id: &str, state: &Value) -> bool {
        let Some(current) = self.get_state(entity_id) else {
            return false;
        };

        // Strings are iterable in minijinja, so test for them first
        if let Some(expected) = state.as_str() {
            return current == expected;
        }
        match state.try_iter() {
            Ok(mut iter) => iter.any(|v| v.as_str() == Some(current.as_str())),
            Err(_) => false,
        }
    }

    /// Attribute value, undefined when the entity or attribute is missing
    pub fn state_attr(&self, entity_id: &str, attribute: &str) -> Value {
        self.live
            .get_state(entity_id)
            .and_then(|s| s.attributes.get(attribute).map(Value::from_serialize))
            .unwrap_or(Value::UNDEFINED)
    }

    pub fn is_state_attr(&self, entity_id: &str, attribute: &str, value: &Value) -> bool {
        let current = self.state_attr(entity_id, attribute);
        !current.is_undefined() && &current == value
    }

    /// Entity exists and is neither unknown nor unavailable
    pub fn has_value(&self, entity_id: &str) -> bool {
        self.live
            .get_state(entity_id)
            .map(|s| !s.is_unavailable() && !s.is_unknown())
            .unwrap_or(false)
    }
}

impl Object for StatesObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;

        if key.contains('.') {
            return self.live.get_state(key).map(state_to_value);
        }

        Some(Value::from_object(DomainProxy {
            domain: key.to_string(),
            live: self.live.clone(),
        }))
    }

    fn call(self: &Arc<Self>, _state: &minijinja::State, args: &[Value]) -> Result<Value, Error> {
        let entity_id = args.first().and_then(|v| v.as_str()).ok_or_else(|| {
            Error::new(ErrorKind::MissingArgument, "states() requires an entity_id")
        })?;

        Ok(self
            .get_state(entity_id)
            .map(Value::from)
            .unwrap_or(Value::UNDEFINED))
    }
}

/// `states.<domain>` half of the `states.<domain>.<object_id>` syntax
#[derive(Clone)]
struct DomainProxy {
    domain: String,
    live: Arc<dyn LiveState>,
}

impl fmt::Debug for DomainProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainProxy")
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl Object for DomainProxy {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let entity_id = format!("{}.{}", self.domain, key.as_str()?);
        self.live.get_state(&entity_id).map(state_to_value)
    }
}

fn state_to_value(state: State) -> Value {
    Value::from_object(StateWrapper(state))
}

/// A state object as seen from templates
#[derive(Debug, Clone)]
pub(crate) struct StateWrapper(State);

impl Object for StateWrapper {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let key = key.as_str()?;
        match key {
            "state" => Some(Value::from(self.0.state.as_str())),
            "entity_id" => Some(Value::from(self.0.entity_id.to_string())),
            "domain" => Some(Value::from(self.0.entity_id.domain())),
            "object_id" => Some(Value::from(self.0.entity_id.object_id())),
            "name" => Some(
                self.0
                    .attributes
                    .get("friendly_name")
                    .and_then(|v| v.as_str())
                    .map(Value::from)
                    .unwrap_or_else(|| Value::from(self.0.entity_id.object_id())),
            ),
            "last_changed" => Some(Value::from(self.0.last_changed.to_rfc3339())),
            "last_updated" => Some(Value::from(self.0.last_updated.to_rfc3339())),
            "attributes" => Some(Value::from_serialize(&self.0.attributes)),
            _ => None,
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.state)
    }
}
