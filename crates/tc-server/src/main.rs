//! Template climate host
//!
//! Usage: `template-climate [CONFIG_DIR] [FILE]`
//!
//! Loads the configuration, seeds the state store, sets up every template
//! climate and logs a snapshot of each one on every poll interval until
//! interrupted.

mod host;

use anyhow::Result;
use host::TemplateClimateHost;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_DIR: &str = "config";
const DEFAULT_CONFIG_FILE: &str = "configuration.yaml";
const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let mut args = std::env::args().skip(1);
    let config_dir = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string()));
    let file = args.next().unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    info!(config_dir = %config_dir.display(), %file, "Starting template climate host");
    let host = TemplateClimateHost::load(&config_dir, &file)?;

    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for snapshot in host.poll_all() {
                    info!(
                        entity_id = %snapshot.entity_id,
                        state = %snapshot.state_string(),
                        attributes = %serde_json::to_string(&snapshot.attributes)?,
                        "Polled climate"
                    );
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    info!("Shutting down...");
    Ok(())
}
