//! Call context for tracing where a service call came from

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Origin of a service call or state write
///
/// Script runs create a child context of the invocation that started them,
/// so every service call a run performs can be traced back to the command
/// that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// User that initiated the action, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Context this one was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new root context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: None,
            parent_id: None,
        }
    }

    /// Create a root context attributed to a user
    pub fn with_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::new()
        }
    }

    /// Derive a child context that keeps the user and points back at `self`
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: self.user_id.clone(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
