//! Platform setup: configuration in, entities out
//!
//! There is no global entity table. [`setup`] and [`reload`] return the
//! entities and the host decides where to keep them.

use crate::entity::ClimateEntity;
use crate::error::ClimateError;
use crate::spec::ClimateEntitySpec;
use std::collections::HashSet;
use std::sync::Arc;
use tc_config::PlatformConfig;
use tc_core::{LiveState, ServiceDispatcher};
use tc_template::TemplateInterpreter;
use tracing::{error, info, instrument};

/// The host collaborators every entity talks to
#[derive(Clone)]
pub struct Host {
    pub states: Arc<dyn LiveState>,
    pub templates: Arc<dyn TemplateInterpreter>,
    pub services: Arc<dyn ServiceDispatcher>,
}

impl Host {
    pub fn new(
        states: Arc<dyn LiveState>,
        templates: Arc<dyn TemplateInterpreter>,
        services: Arc<dyn ServiceDispatcher>,
    ) -> Self {
        Self {
            states,
            templates,
            services,
        }
    }
}

/// Result of setting up one platform block
#[derive(Debug, Default)]
pub struct PlatformSetup {
    pub entities: Vec<Arc<ClimateEntity>>,

    /// Entries that failed to load; the others are unaffected
    pub errors: Vec<ClimateError>,
}

impl PlatformSetup {
    pub fn entity(&self, entity_id: &str) -> Option<&Arc<ClimateEntity>> {
        self.entities
            .iter()
            .find(|e| e.entity_id().to_string() == entity_id)
    }
}

/// Build every climate of `platform`
#[instrument(skip_all, fields(climates = platform.climates.len()))]
pub fn setup(platform: &PlatformConfig, host: &Host) -> PlatformSetup {
    let mut result = PlatformSetup::default();
    let mut unique_ids = HashSet::new();

    for (key, config) in platform.climate_configs() {
        let built = config
            .map_err(|e| ClimateError::configuration(key.as_str(), e))
            .and_then(|config| {
                ClimateEntitySpec::from_config(&key, &config, &platform.variables, host.templates.as_ref())
            })
            .and_then(|spec| {
                if unique_ids.insert(spec.unique_id().to_string()) {
                    Ok(spec)
                } else {
                    Err(ClimateError::configuration(
                        spec.entity_id().to_string(),
                        format!("duplicate unique_id '{}'", spec.unique_id()),
                    ))
                }
            });

        match built {
            Ok(spec) => {
                result
                    .entities
                    .push(Arc::new(ClimateEntity::new(Arc::new(spec), host.clone())));
            }
            Err(err) => {
                error!(climate = %key, error = %err, "Failed to set up template climate");
                result.errors.push(err);
            }
        }
    }

    info!(
        loaded = result.entities.len(),
        failed = result.errors.len(),
        "Template climate platform set up"
    );
    result
}

/// Rebuild a platform from new configuration
///
/// Entities from the previous setup stay valid for anything still holding
/// them, including in-flight script runs.
pub fn reload(platform: &PlatformConfig, host: &Host) -> PlatformSetup {
    info!("Reloading template climates");
    setup(platform, host)
}
