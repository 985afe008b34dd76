//! The in-process host: state store, services, templates and climates

use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;
use tc_climate::{setup, ClimateEntity, ClimateSnapshot, Host};
use tc_config::{load_config, HostConfig};
use tc_core::{Context, EntityId};
use tc_service_registry::devices::{register_climate_services, register_switch_services};
use tc_service_registry::ServiceRegistry;
use tc_state_store::StateStore;
use tc_template::TemplateEngine;
use tracing::{info, warn};

/// Everything the climates run against
pub struct TemplateClimateHost {
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
    pub climates: Vec<Arc<ClimateEntity>>,
    host: Host,
}

impl TemplateClimateHost {
    /// Create an empty host with the device services registered
    pub fn new() -> Self {
        let states = Arc::new(StateStore::new());
        let services = Arc::new(ServiceRegistry::new());
        register_switch_services(&services, states.clone());
        register_climate_services(&services, states.clone());

        let templates = Arc::new(TemplateEngine::new(states.clone()));
        let host = Host::new(states.clone(), templates, services.clone());

        Self {
            states,
            services,
            climates: Vec::new(),
            host,
        }
    }

    /// Load `file` from `config_dir` and bring everything up
    pub fn load(config_dir: &Path, file: &str) -> Result<Self> {
        let config = load_config(config_dir, file)
            .with_context(|| format!("loading {}", config_dir.join(file).display()))?;
        let mut host = Self::new();
        host.apply(&config);
        Ok(host)
    }

    /// Seed states, then set up every template climate platform
    pub fn apply(&mut self, config: &HostConfig) {
        for (id, seed) in &config.states {
            match id.parse::<EntityId>() {
                Ok(entity_id) => {
                    self.states
                        .set(entity_id, seed.state.clone(), seed.attributes.clone(), Context::new());
                }
                Err(e) => warn!(entity_id = %id, error = %e, "Skipping invalid seed state"),
            }
        }
        info!(count = config.states.len(), "Seeded states");

        self.climates.clear();
        for platform in config.template_platforms() {
            let result = setup(platform, &self.host);
            self.climates.extend(result.entities);
        }
        info!(count = self.climates.len(), "Template climates ready");
    }

    /// Poll every climate and publish its state to the store
    pub fn poll_all(&self) -> Vec<ClimateSnapshot> {
        self.climates
            .iter()
            .map(|climate| {
                let snapshot = climate.poll();
                self.states.set(
                    snapshot.entity_id.clone(),
                    snapshot.state_string(),
                    snapshot.to_state(Context::new()).attributes,
                    Context::new(),
                );
                snapshot
            })
            .collect()
    }
}

impl Default for TemplateClimateHost {
    fn default() -> Self {
        Self::new()
    }
}
