//! Loading complete configuration files

use std::fs;
use tc_config::{load_config, load_config_str, ConfigError, PLATFORM};
use tempfile::TempDir;

const CONFIG: &str = r#"
states:
  climate.hallway:
    state: cool
    attributes:
      hvac_modes: [off, cool]
      supported_features: 385
  switch.heater:
    state: "off"

climate:
  - platform: generic_thermostat
    climates: {}
  - platform: template_climate
    variables:
      heater: switch.heater
    climates:
      hallway_proxy:
        friendly_name: Hallway
        temperature_unit: "°C"
        base_climate_entity_id: !secret hallway
        state: "{{ 'heat' if is_state(heater, 'on') else states('climate.hallway') }}"
        attributes:
          current_temperature: "{{ state_attr('climate.hallway', attribute) }}"
        hvac_mode_scripts:
          heat: !include scripts/heat.yaml
"#;

fn write(dir: &TempDir, name: &str, content: &str) {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_load_full_configuration() {
    let dir = TempDir::new().unwrap();
    write(&dir, "configuration.yaml", CONFIG);
    write(&dir, "secrets.yaml", "hallway: climate.hallway\n");
    write(
        &dir,
        "scripts/heat.yaml",
        "- action: switch.turn_on\n  target:\n    entity_id: \"{{ heater }}\"\n",
    );

    let config = load_config(dir.path(), "configuration.yaml").unwrap();

    assert_eq!(config.states.len(), 2);
    assert_eq!(config.states["switch.heater"].state, "off");
    assert_eq!(
        config.states["climate.hallway"].attributes["supported_features"],
        serde_json::json!(385)
    );

    let platforms: Vec<_> = config.template_platforms().collect();
    assert_eq!(platforms.len(), 1);
    assert_eq!(platforms[0].platform, PLATFORM);
    assert_eq!(platforms[0].variables["heater"], serde_json::json!("switch.heater"));

    let climates = platforms[0].climate_configs();
    let (key, climate) = &climates[0];
    let climate = climate.as_ref().unwrap();
    assert_eq!(key, "hallway_proxy");
    assert_eq!(climate.base_climate_entity_id.as_deref(), Some("climate.hallway"));
    assert_eq!(climate.temperature_unit.as_deref(), Some("°C"));
    assert_eq!(climate.hvac_mode_scripts["heat"].len(), 1);
    assert_eq!(
        climate.hvac_mode_scripts["heat"][0]["target"]["entity_id"],
        serde_json::json!("{{ heater }}")
    );
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = load_config(dir.path(), "nope.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[test]
fn test_invalid_yaml() {
    let err = load_config_str(".", "climate: [unclosed").unwrap_err();
    assert!(matches!(err, ConfigError::ParseYaml { .. }));
}
