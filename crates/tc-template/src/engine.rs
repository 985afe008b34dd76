//! minijinja-backed template engine

use crate::error::TemplateResult;
use crate::filters;
use crate::states::StatesObject;
use crate::{is_template, Bindings, TemplateInterpreter};
use minijinja::value::{Rest, Value};
use minijinja::Environment;
use std::collections::BTreeSet;
use std::sync::Arc;
use tc_core::LiveState;
use tracing::trace;

/// Template engine with live-state helpers
///
/// The engine provides:
/// - Access to entity states via the `states` object
/// - State functions like `is_state()`, `state_attr()`, `has_value()`
/// - Conversion filters `float`, `int`, `bool` and `round`
/// - `iif()`, `min()`, `max()` globals
pub struct TemplateEngine {
    env: Environment<'static>,
    states: Arc<StatesObject>,
}

impl TemplateEngine {
    pub fn new(live: Arc<dyn LiveState>) -> Self {
        let states = Arc::new(StatesObject::new(live));
        let mut env = Environment::new();

        Self::register_filters(&mut env);
        Self::register_globals(&mut env, states.clone());
        env.add_test("number", filters::is_number);

        Self { env, states }
    }

    fn register_filters(env: &mut Environment<'static>) {
        env.add_filter("float", filters::to_float);
        env.add_filter("int", filters::to_int);
        env.add_filter("bool", filters::to_bool);
        env.add_filter("round", filters::round_filter);
    }

    fn register_globals(env: &mut Environment<'static>, states: Arc<StatesObject>) {
        env.add_global("states", Value::from_object((*states).clone()));

        let s = states.clone();
        env.add_function("is_state", move |entity_id: &str, state: Value| {
            s.is_state(entity_id, &state)
        });

        let s = states.clone();
        env.add_function("state_attr", move |entity_id: &str, attribute: &str| {
            s.state_attr(entity_id, attribute)
        });

        let s = states.clone();
        env.add_function(
            "is_state_attr",
            move |entity_id: &str, attribute: &str, value: Value| {
                s.is_state_attr(entity_id, attribute, &value)
            },
        );

        let s = states;
        env.add_function("has_value", move |entity_id: &str| s.has_value(entity_id));

        env.add_function("iif", filters::iif);
        env.add_function("min", |args: Rest<Value>| filters::min_fn(&args));
        env.add_function("max", |args: Rest<Value>| filters::max_fn(&args));
    }

    /// Render a template to text with `context` in scope
    pub fn render_with_context(
        &self,
        template: &str,
        context: impl serde::Serialize,
    ) -> TemplateResult<String> {
        trace!(template, "Rendering template");
        let tmpl = self.env.template_from_str(template)?;
        Ok(tmpl.render(context)?)
    }

    pub fn render(&self, template: &str) -> TemplateResult<String> {
        self.render_with_context(template, ())
    }

    pub fn states(&self) -> &StatesObject {
        &self.states
    }
}

/// Turn rendered text back into a typed value
///
/// Numbers, booleans, lists and mappings written as JSON come back typed;
/// anything else stays a string. Blank output means "no value".
fn parse_result(rendered: &str) -> serde_json::Value {
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string()))
}

impl TemplateInterpreter for TemplateEngine {
    fn evaluate(&self, text: &str, bindings: &Bindings) -> TemplateResult<serde_json::Value> {
        if !is_template(text) {
            return Ok(serde_json::Value::String(text.to_string()));
        }
        let rendered = self.render_with_context(text, bindings)?;
        Ok(parse_result(&rendered))
    }

    fn referenced_names(&self, text: &str) -> TemplateResult<BTreeSet<String>> {
        if !is_template(text) {
            return Ok(BTreeSet::new());
        }
        let tmpl = self.env.template_from_str(text)?;
        Ok(tmpl.undeclared_variables(false).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TemplateError;
    use serde_json::json;
    use std::collections::HashMap;
    use tc_core::{Context, EntityId};
    use tc_state_store::StateStore;

    fn make_test_engine() -> TemplateEngine {
        let store = Arc::new(StateStore::new());
        store.set(
            EntityId::new("climate", "base").unwrap(),
            "heat",
            HashMap::from([
                ("temperature".to_string(), json!(21.5)),
                ("hvac_modes".to_string(), json!(["off", "heat"])),
            ]),
            Context::new(),
        );
        store.set(
            EntityId::new("switch", "heater").unwrap(),
            "on",
            HashMap::new(),
            Context::new(),
        );
        TemplateEngine::new(store)
    }

    fn bindings(value: serde_json::Value) -> Bindings {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Bindings::new(),
        }
    }

    #[test]
    fn test_plain_text_is_returned_verbatim() {
        let engine = make_test_engine();
        let value = engine.evaluate("  heat  ", &Bindings::new()).unwrap();
        assert_eq!(value, json!("  heat  "));
    }

    #[test]
    fn test_typed_results() {
        let engine = make_test_engine();
        let empty = Bindings::new();
        assert_eq!(engine.evaluate("{{ 20 + 1 }}", &empty).unwrap(), json!(21));
        assert_eq!(engine.evaluate("{{ 1.5 * 2 }}", &empty).unwrap(), json!(3.0));
        assert_eq!(engine.evaluate("{{ true }}", &empty).unwrap(), json!(true));
        assert_eq!(engine.evaluate("{{ 'cool' }}", &empty).unwrap(), json!("cool"));
        assert_eq!(engine.evaluate("{{ '' }}", &empty).unwrap(), json!(null));
        assert_eq!(engine.evaluate("{{ [1, 2] }}", &empty).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_bindings_in_scope() {
        let engine = make_test_engine();
        let b = bindings(json!({"attribute": "temperature", "offset": 2}));
        let value = engine
            .evaluate("{{ state_attr('climate.base', attribute) + offset }}", &b)
            .unwrap();
        assert_eq!(value, json!(23.5));
    }

    #[test]
    fn test_state_helpers() {
        let engine = make_test_engine();
        let empty = Bindings::new();
        assert_eq!(
            engine.evaluate("{{ states('switch.heater') }}", &empty).unwrap(),
            json!("on")
        );
        assert_eq!(
            engine.evaluate("{{ states.climate.base.state }}", &empty).unwrap(),
            json!("heat")
        );
        assert_eq!(
            engine
                .evaluate("{{ is_state('switch.heater', 'on') }}", &empty)
                .unwrap(),
            json!(true)
        );
        assert_eq!(
            engine
                .evaluate("{{ 'heat' in state_attr('climate.base', 'hvac_modes') }}", &empty)
                .unwrap(),
            json!(true)
        );
        assert_eq!(
            engine.evaluate("{{ has_value('switch.nothing') }}", &empty).unwrap(),
            json!(false)
        );
    }

    #[test]
    fn test_live_state_read_at_evaluation() {
        let store = Arc::new(StateStore::new());
        let engine = TemplateEngine::new(store.clone());
        let id = EntityId::new("switch", "x").unwrap();

        store.set(id.clone(), "off", HashMap::new(), Context::new());
        assert_eq!(
            engine.evaluate("{{ states('switch.x') }}", &Bindings::new()).unwrap(),
            json!("off")
        );
        store.set(id, "on", HashMap::new(), Context::new());
        assert_eq!(
            engine.evaluate("{{ states('switch.x') }}", &Bindings::new()).unwrap(),
            json!("on")
        );
    }

    #[test]
    fn test_errors() {
        let engine = make_test_engine();
        let err = engine.evaluate("{{ 1 + }}", &Bindings::new()).unwrap_err();
        assert!(matches!(err, TemplateError::SyntaxError { .. }));

        let err = engine
            .evaluate("{{ 'warm' | float }}", &Bindings::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::RenderError { .. }));
    }

    #[test]
    fn test_referenced_names() {
        let engine = make_test_engine();
        let names = engine
            .referenced_names("{% set y = 2 %}{{ target + offset + y }}")
            .unwrap();
        assert!(names.contains("target"));
        assert!(names.contains("offset"));
        assert!(!names.contains("y"));

        assert!(engine.referenced_names("plain").unwrap().is_empty());
        assert!(engine.referenced_names("{{ (").is_err());
    }
}
