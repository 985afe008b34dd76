//! Service registry with async handlers
//!
//! The [`ServiceRegistry`] maps `domain.service` ids to async handlers and
//! implements [`ServiceDispatcher`], so the climate core can hand it every
//! call a script or a base-entity delegation makes. [`devices`] registers
//! state-backed handlers for plain switches and climates, which is what the
//! host binary and the integration tests drive.

pub mod devices;

use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tc_core::{ServiceCall, ServiceDispatcher, ServiceError, ServiceResult};
use tracing::{debug, instrument, warn};

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// The `domain.service` a handler is registered under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    pub domain: String,
    pub service: String,
}

impl ServiceDescription {
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
        }
    }
}

/// All registered handlers, indexed by `domain.service`
pub struct ServiceRegistry {
    services: DashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register (or replace) a service handler
    #[instrument(skip(self, handler), fields(domain = %description.domain, service = %description.service))]
    pub fn register<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let key = format!("{}.{}", description.domain, description.service);
        debug!("Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(key, handler);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceDispatcher for ServiceRegistry {
    async fn invoke(&self, call: ServiceCall) -> ServiceResult {
        let handler = match self.services.get(&call.service_id()) {
            Some(handler) => handler.clone(),
            None => {
                warn!(domain = %call.domain, service = %call.service, "Service not found");
                return Err(ServiceError::NotFound {
                    domain: call.domain,
                    service: call.service,
                });
            }
        };

        debug!(service = %call.service_id(), "Calling service");
        // The map guard is released above; handlers may register services
        handler(call).await
    }
}
