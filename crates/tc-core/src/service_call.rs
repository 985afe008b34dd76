//! Service calls and the dispatcher contract that performs them

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Context;

/// Result of performing a service call
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Errors a service dispatcher can report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// A request to run `domain.service` with some data
///
/// Targets are carried inside `service_data` under `entity_id`, the same
/// way the host's service layer receives them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g. "climate", "switch")
    pub domain: String,

    /// The service name (e.g. "turn_on", "set_hvac_mode")
    pub service: String,

    pub service_data: serde_json::Value,

    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Parse a `domain.service` identifier
    pub fn parse_service_id(service_id: &str) -> Option<(&str, &str)> {
        service_id
            .split_once('.')
            .filter(|(domain, service)| !domain.is_empty() && !service.is_empty())
    }

    /// Full service identifier (`domain.service`)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a value from service_data
    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Targeted entity ids, whether given as one string or a list
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get("entity_id") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}

/// Performs service calls on behalf of scripts and base-entity delegation
///
/// Calls may suspend (network round-trips, device acknowledgements); an
/// `Err` means the call itself failed and is never retried by the caller.
#[async_trait]
pub trait ServiceDispatcher: Send + Sync {
    async fn invoke(&self, call: ServiceCall) -> ServiceResult;
}
