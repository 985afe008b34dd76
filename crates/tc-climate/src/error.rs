//! Error types for template climates

use crate::features::DispatchKind;
use tc_core::ServiceError;
use tc_script::StepError;
use tc_template::TemplateError;
use thiserror::Error;

/// Result type for climate operations
pub type ClimateResult<T> = Result<T, ClimateError>;

/// Errors raised while loading, reading or commanding a template climate
///
/// Each variant is scoped to the smallest unit it affects: one attribute,
/// one evaluation cycle, one run, or one entity at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClimateError {
    /// The entity could not be built from its configuration
    #[error("invalid configuration for {entity}: {reason}")]
    Configuration { entity: String, reason: String },

    /// A declared variable failed; no context was produced
    #[error("variable '{name}' could not be resolved: {cause}")]
    VariableResolution { name: String, cause: TemplateError },

    /// One template failed to evaluate
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// A local script failed at `step`
    #[error("script for {kind} '{key}' failed at step {step}: {cause}")]
    DispatchFailure {
        kind: DispatchKind,
        key: String,
        step: usize,
        cause: StepError,
    },

    /// The base entity rejected a delegated command
    #[error("base entity {entity_id} failed: {cause}")]
    Delegation {
        entity_id: String,
        cause: ServiceError,
    },

    /// Neither a local script nor the base entity handles this key
    #[error("{kind} '{key}' is not supported")]
    Unsupported { kind: DispatchKind, key: String },
}

impl ClimateError {
    pub(crate) fn configuration(entity: impl Into<String>, reason: impl ToString) -> Self {
        ClimateError::Configuration {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }
}
