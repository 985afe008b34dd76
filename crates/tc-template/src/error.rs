//! Error types for template evaluation

use thiserror::Error;

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while parsing or rendering a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Invalid template syntax
    #[error("invalid template syntax: {message}")]
    SyntaxError { message: String },

    /// Undefined variable used where a value was required
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    /// Any other failure while rendering (bad filter input, type errors)
    #[error("failed to render template: {message}")]
    RenderError { message: String },
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            minijinja::ErrorKind::SyntaxError => TemplateError::SyntaxError {
                message: err.to_string(),
            },
            minijinja::ErrorKind::UndefinedError => TemplateError::UndefinedVariable {
                name: err.to_string(),
            },
            _ => TemplateError::RenderError {
                message: err.to_string(),
            },
        }
    }
}
