//! Per-evaluation variable environments
//!
//! Binding precedence, lowest first:
//!
//! 1. `base_entity_id`, when a base entity is configured
//! 2. invocation parameters
//! 3. declared variables, platform-wide then entity-local; each sees the
//!    ones before it and may shadow them
//! 4. `attribute`, only while that attribute is being resolved

use crate::error::{ClimateError, ClimateResult};
use crate::resolver;
use crate::spec::ClimateEntitySpec;
use serde_json::Value;
use tc_template::{Bindings, TemplateInterpreter};
use tracing::trace;

/// Name the attribute being resolved is bound to
pub const ATTRIBUTE_BINDING: &str = "attribute";

/// Name the base entity id is bound to
pub const BASE_ENTITY_BINDING: &str = "base_entity_id";

/// Bindings owned by exactly one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    bindings: Bindings,
    attribute: Option<String>,
}

impl EvaluationContext {
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// A copy with `attribute` bound to `name`
    pub fn with_attribute(&self, name: &str) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.insert(ATTRIBUTE_BINDING.to_string(), Value::String(name.to_string()));
        Self {
            bindings,
            attribute: Some(name.to_string()),
        }
    }

    pub fn into_bindings(self) -> Bindings {
        self.bindings
    }
}

/// Build the context for one read or dispatch
///
/// Fails with [`ClimateError::VariableResolution`] on the first variable that
/// does not resolve; no partial context is returned.
pub fn build(
    spec: &ClimateEntitySpec,
    templates: &dyn TemplateInterpreter,
    params: &Bindings,
    attribute: Option<&str>,
) -> ClimateResult<EvaluationContext> {
    let context = resolve_variables(spec, templates, seed(spec, params))?;
    Ok(match attribute {
        Some(name) => context.with_attribute(name),
        None => context,
    })
}

/// `base_entity_id` and the invocation parameters, before any variable
fn seed(spec: &ClimateEntitySpec, params: &Bindings) -> Bindings {
    let mut bindings = Bindings::new();
    if let Some(base) = spec.base_entity() {
        bindings.insert(BASE_ENTITY_BINDING.to_string(), Value::String(base.to_string()));
    }
    bindings.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    bindings
}

fn resolve_variables(
    spec: &ClimateEntitySpec,
    templates: &dyn TemplateInterpreter,
    mut bindings: Bindings,
) -> ClimateResult<EvaluationContext> {
    for decl in spec.variables() {
        let value = resolver::resolve(templates, &decl.template, &bindings).map_err(|cause| {
            ClimateError::VariableResolution {
                name: decl.name.clone(),
                cause,
            }
        })?;
        trace!(name = %decl.name, ?value, "Resolved variable");
        bindings.insert(decl.name.clone(), value);
    }

    Ok(EvaluationContext {
        bindings,
        attribute: None,
    })
}

/// Variables resolved once and shared by every attribute of one poll
#[derive(Debug, Clone)]
pub struct EvaluationCycle {
    seed: EvaluationContext,
    variables: ClimateResult<EvaluationContext>,
}

impl EvaluationCycle {
    pub fn begin(
        spec: &ClimateEntitySpec,
        templates: &dyn TemplateInterpreter,
        params: &Bindings,
    ) -> Self {
        let seed = EvaluationContext {
            bindings: seed(spec, params),
            attribute: None,
        };
        let variables = resolve_variables(spec, templates, seed.bindings.clone());
        Self { seed, variables }
    }

    /// Context for `attribute` with no declared variable bound
    pub fn seed_for(&self, attribute: &str) -> EvaluationContext {
        self.seed.with_attribute(attribute)
    }

    /// Context for resolving `attribute`, or the cycle's variable failure
    pub fn context_for(&self, attribute: &str) -> ClimateResult<EvaluationContext> {
        match &self.variables {
            Ok(context) => Ok(context.with_attribute(attribute)),
            Err(err) => Err(err.clone()),
        }
    }

    pub fn variables(&self) -> Result<&EvaluationContext, &ClimateError> {
        self.variables.as_ref()
    }
}
