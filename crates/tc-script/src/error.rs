//! Script errors

use tc_core::ServiceError;
use tc_template::TemplateError;
use thiserror::Error;

/// Result type for compiling action sequences
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Rejected action configuration, reported at load time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("invalid action at step {index}: {message}")]
    InvalidAction { index: usize, message: String },

    #[error("invalid service '{0}', expected domain.service")]
    InvalidService(String),

    #[error("invalid delay '{0}'")]
    InvalidDelay(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),
}

/// Why a run stopped with a failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("service call failed: {0}")]
    Dispatch(#[from] ServiceError),

    #[error("invalid service '{0}'")]
    InvalidService(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("stopped: {0}")]
    Stopped(String),
}
