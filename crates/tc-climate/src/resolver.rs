//! Template resolution for configured values
//!
//! Configured values are either template text or literals (numbers, lists,
//! mappings) that may contain template strings. Strings go through the
//! interpreter; containers are resolved element by element; everything else
//! is returned as-is.

use serde_json::Value;
use std::collections::BTreeSet;
use tc_template::{is_template, Bindings, TemplateInterpreter, TemplateResult};

/// Resolve one configured value against `bindings`
pub fn resolve(
    templates: &dyn TemplateInterpreter,
    value: &Value,
    bindings: &Bindings,
) -> TemplateResult<Value> {
    match value {
        Value::String(text) => templates.evaluate(text, bindings),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(templates, item, bindings))
            .collect::<TemplateResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve(templates, item, bindings)?);
            }
            Ok(Value::Object(resolved))
        }
        literal => Ok(literal.clone()),
    }
}

/// Resolve an optional template; `None` means "not defined", not an error
pub fn resolve_optional(
    templates: &dyn TemplateInterpreter,
    value: Option<&Value>,
    bindings: &Bindings,
) -> Option<TemplateResult<Value>> {
    value.map(|v| resolve(templates, v, bindings))
}

/// True when no string inside `value` carries template syntax
pub fn is_literal(value: &Value) -> bool {
    match value {
        Value::String(text) => !is_template(text),
        Value::Array(items) => items.iter().all(is_literal),
        Value::Object(map) => map.values().all(is_literal),
        _ => true,
    }
}

/// Every free name any template inside `value` reads
pub fn referenced_names(
    templates: &dyn TemplateInterpreter,
    value: &Value,
) -> TemplateResult<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    collect_names(templates, value, &mut names)?;
    Ok(names)
}

fn collect_names(
    templates: &dyn TemplateInterpreter,
    value: &Value,
    names: &mut BTreeSet<String>,
) -> TemplateResult<()> {
    match value {
        Value::String(text) => names.extend(templates.referenced_names(text)?),
        Value::Array(items) => {
            for item in items {
                collect_names(templates, item, names)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_names(templates, item, names)?;
            }
        }
        _ => {}
    }
    Ok(())
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

    #[test]
    fn test_resolve_nested_values() {
        let engine = engine();
        let mut bindings = Bindings::new();
        bindings.insert("x".into(), json!(2));

        let value = json!({"a": "{{ x * 2 }}", "b": [1, "{{ x }}"], "c": true, "d": "plain"});
        assert_eq!(
            resolve(&engine, &value, &bindings).unwrap(),
            json!({"a": 4, "b": [1, 2], "c": true, "d": "plain"})
        );
    }

    #[test]
    fn test_resolve_optional() {
        let engine = engine();
        assert!(resolve_optional(&engine, None, &Bindings::new()).is_none());
        assert_eq!(
            resolve_optional(&engine, Some(&json!("{{ 1 }}")), &Bindings::new()),
            Some(Ok(json!(1)))
        );
    }

    #[test]
    fn test_is_literal() {
        assert!(is_literal(&json!("Plain")));
        assert!(is_literal(&json!({"a": [1, "b"], "c": null})));
        assert!(!is_literal(&json!("{{ x }}")));
        assert!(!is_literal(&json!({"a": [1, "{% if x %}b{% endif %}"]})));
    }

    #[test]
    fn test_referenced_names_in_containers() {
        let engine = engine();
        let names = referenced_names(&engine, &json!(["{{ a }}", {"k": "{{ b + 1 }}"}, 3])).unwrap();
        assert!(names.contains("a"));
        assert!(names.contains("b"));
        assert!(referenced_names(&engine, &json!(5)).unwrap().is_empty());
    }
}
