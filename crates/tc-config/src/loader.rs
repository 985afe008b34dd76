//! YAML loader with custom tag support
//!
//! Supports the host's custom YAML tags:
//! - `!include path` - Include another YAML file, relative to the including file
//! - `!secret key` - Substitute from `secrets.yaml` in the config directory
//! - `!env_var VAR` - Environment variable substitution

use crate::error::{ConfigError, ConfigResult};
use crate::schema::HostConfig;
use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Option<HashMap<String, String>>,
    /// Files currently being loaded, for circular include detection
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets: None,
            include_stack: HashSet::new(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!(?path, "Loading YAML file");

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);
        result
    }

    /// Load and process YAML text; `source_path` anchors relative includes
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source,
        })?;
        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    result.insert(k, self.process_value(v, source_path)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => Ok(Value::Sequence(
                seq.into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect::<ConfigResult<_>>()?,
            )),
            other => Ok(other),
        }
    }

    fn process_tagged(&mut self, tagged: TaggedValue, source_path: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(%tag, "Processing tag");

        match tag.as_str() {
            "!include" => {
                let name = tag_argument(&tag, &tagged.value)?;
                let base = source_path.parent().unwrap_or(&self.config_dir);
                let path = base.join(name);
                self.load_file(path)
            }
            "!secret" => {
                let key = tag_argument(&tag, &tagged.value)?;
                let value = self.secret(key)?;
                Ok(Value::String(value))
            }
            "!env_var" => {
                let var = tag_argument(&tag, &tagged.value)?;
                std::env::var(var)
                    .map(Value::String)
                    .map_err(|_| ConfigError::EnvVarNotFound { var: var.to_string() })
            }
            _ => {
                let value = self.process_value(tagged.value, source_path)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }

    /// Look up a secret, reading `secrets.yaml` on first use
    fn secret(&mut self, key: &str) -> ConfigResult<String> {
        if self.secrets.is_none() {
            self.secrets = Some(load_secrets(&self.config_dir)?);
        }
        self.secrets
            .as_ref()
            .and_then(|s| s.get(key))
            .cloned()
            .ok_or_else(|| ConfigError::SecretNotFound { key: key.to_string() })
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}

fn tag_argument<'a>(tag: &str, value: &'a Value) -> ConfigResult<&'a str> {
    value.as_str().ok_or_else(|| ConfigError::InvalidValue {
        key: tag.to_string(),
        reason: "argument must be a string".to_string(),
    })
}

fn load_secrets(config_dir: &Path) -> ConfigResult<HashMap<String, String>> {
    let path = config_dir.join("secrets.yaml");
    if !path.exists() {
        debug!(?path, "No secrets.yaml found");
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
        path: path.clone(),
        source,
    })?;
    let raw: HashMap<String, Value> =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::ParseYaml {
            path: path.clone(),
            source,
        })?;

    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => String::new(),
            };
            (k, text)
        })
        .collect())
}

fn into_host_config(value: Value, path: &Path) -> ConfigResult<HostConfig> {
    if value.is_null() {
        return Ok(HostConfig::default());
    }
    serde_yaml::from_value(value).map_err(|source| ConfigError::ParseYaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a host configuration file from `config_dir`
pub fn load_config(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<HostConfig> {
    let mut loader = YamlLoader::new(config_dir);
    let path = loader.resolve_path(file.as_ref());
    let value = loader.load_file(&path)?;
    into_host_config(value, &path)
}

/// Load a host configuration from YAML text
pub fn load_config_str(config_dir: impl Into<PathBuf>, content: &str) -> ConfigResult<HostConfig> {
    let mut loader = YamlLoader::new(config_dir);
    let source = loader.config_dir().join("<string>");
    let value = loader.load_string(content, &source)?;
    into_host_config(value, &source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "climates/scripts.yaml", "- action: switch.turn_on\n");
        write_file(dir.path(), "climates/main.yaml", "turn_on: !include scripts.yaml\n");
        write_file(dir.path(), "configuration.yaml", "service_scripts: !include climates/main.yaml\n");

        let mut loader = YamlLoader::new(dir.path());
        let value = loader.load_file("configuration.yaml").unwrap();
        let script = &value["service_scripts"]["turn_on"][0]["action"];
        assert_eq!(script.as_str(), Some("switch.turn_on"));
    }

    #[test]
    fn test_secret_and_missing_secret() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "base: climate.hallway\nport: 8123\n");

        let mut loader = YamlLoader::new(dir.path());
        let value = loader
            .load_string("a: !secret base\nb: !secret port\n", &dir.path().join("c.yaml"))
            .unwrap();
        assert_eq!(value["a"].as_str(), Some("climate.hallway"));
        assert_eq!(value["b"].as_str(), Some("8123"));

        let err = loader
            .load_string("a: !secret nope\n", &dir.path().join("c.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::SecretNotFound { key } if key == "nope"));
    }

    #[test]
    fn test_env_var() {
        std::env::set_var("TC_CONFIG_TEST_UNIT", "°F");
        let mut loader = YamlLoader::new(".");
        let value = loader
            .load_string("unit: !env_var TC_CONFIG_TEST_UNIT\n", Path::new("c.yaml"))
            .unwrap();
        assert_eq!(value["unit"].as_str(), Some("°F"));

        let err = loader
            .load_string("unit: !env_var TC_CONFIG_TEST_MISSING\n", Path::new("c.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound { .. }));
    }

    #[test]
    fn test_circular_include_detection() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "a: !include a.yaml\n");

        let err = YamlLoader::new(dir.path()).load_file("a.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::CircularInclude { .. }));
    }

    #[test]
    fn test_empty_file_is_empty_config() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "configuration.yaml", "");
        let config = load_config(dir.path(), "configuration.yaml").unwrap();
        assert!(config.climate.is_empty());
    }
}
