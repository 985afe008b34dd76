//! Action types
//!
//! Scripts are written in the host's automation grammar ([`ActionConfig`])
//! and compiled once, at load time, into a closed set of [`ActionStep`]s.
//! Anything that can be checked without live state (service ids, literal
//! delays, condition shapes) is rejected here rather than at run time.

use crate::error::{ScriptError, ScriptResult};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use tc_core::{EntityId, ServiceCall};
use tc_template::is_template;

/// Deserialize a field that can be either a single string or a list of strings
fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(vec![s]),
        StringOrVec::Vec(v) => Ok(v),
    }
}

fn default_enabled() -> bool {
    true
}

/// One script step as written in configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ActionConfig {
    Service(ServiceConfig),
    Delay(DelayConfig),
    Variables(VariablesConfig),
    If(IfConfig),
    Stop(StopConfig),
    Condition(ConditionConfig),
    /// Bare template string, shorthand for a template condition
    Template(String),
}

/// Service targets
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Target {
    #[serde(default, deserialize_with = "string_or_vec")]
    pub entity_id: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// `domain.service`, written as `action:` or the older `service:`
    #[serde(alias = "action")]
    pub service: String,

    #[serde(default)]
    pub target: Option<Target>,

    /// Legacy top-level target
    #[serde(default, deserialize_with = "string_or_vec")]
    pub entity_id: Vec<String>,

    #[serde(default)]
    pub data: IndexMap<String, Value>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    pub delay: DelaySpec,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Delay length
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DelaySpec {
    /// Plain number of seconds
    Seconds(f64),
    /// `HH:MM:SS`, `MM:SS`, seconds, or a template producing one of those
    Text(String),
    Components(DelayComponents),
}

/// `hours`, `minutes`, `seconds`, `milliseconds`; each a number or a template
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayComponents {
    #[serde(default)]
    pub hours: Value,
    #[serde(default)]
    pub minutes: Value,
    #[serde(default)]
    pub seconds: Value,
    #[serde(default)]
    pub milliseconds: Value,
}

impl DelayComponents {
    fn parts(&self) -> Vec<(DelayUnit, Value)> {
        [
            (DelayUnit::Hours, &self.hours),
            (DelayUnit::Minutes, &self.minutes),
            (DelayUnit::Seconds, &self.seconds),
            (DelayUnit::Milliseconds, &self.milliseconds),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(unit, value)| (unit, value.clone()))
        .collect()
    }
}

/// Unit of one delay component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayUnit {
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl DelayUnit {
    /// Add `count` of this unit to `total`
    ///
    /// `count` is a number or numeric text. `None` on anything negative,
    /// non-numeric or too long for a [`Duration`].
    pub fn add_to(self, total: Duration, count: &Value) -> Option<Duration> {
        let count = match count {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        let secs = match self {
            DelayUnit::Hours => count * 3600.0,
            DelayUnit::Minutes => count * 60.0,
            DelayUnit::Seconds => count,
            DelayUnit::Milliseconds => count / 1000.0,
        };
        total.checked_add(Duration::try_from_secs_f64(secs).ok()?)
    }
}

/// A compiled delay
#[derive(Debug, Clone, PartialEq)]
pub enum DelayDuration {
    /// Seconds, `MM:SS`, `HH:MM:SS`, or a template producing one of those
    Text(String),
    /// Components rendered one by one at run time, then summed
    Components(Vec<(DelayUnit, Value)>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariablesConfig {
    pub variables: IndexMap<String, Value>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IfConfig {
    pub r#if: Conditions,

    pub then: Vec<ActionConfig>,

    #[serde(default)]
    pub r#else: Vec<ActionConfig>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// `if:` accepts a template or a list of conditions that must all hold
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Conditions {
    Template(String),
    List(Vec<ConditionEntry>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConditionEntry {
    Template(String),
    Config(ConditionConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopConfig {
    pub stop: String,

    #[serde(default)]
    pub error: bool,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// `condition: template` or `condition: state`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
    pub condition: String,

    #[serde(default)]
    pub value_template: Option<String>,

    #[serde(default, deserialize_with = "string_or_vec")]
    pub entity_id: Vec<String>,

    #[serde(default, deserialize_with = "string_or_vec")]
    pub state: Vec<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A compiled script step
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStep {
    /// Resolve the data templates, then hand the call to the dispatcher
    ServiceCall {
        service_name: String,
        target: Vec<String>,
        data_templates: IndexMap<String, Value>,
    },
    /// Suspend the run for the resolved duration
    Delay { duration: DelayDuration },
    /// Halt the run when the predicate resolves falsy
    Condition { predicate_template: String },
    /// Bind a variable in the run's private context
    SetVariable { name: String, value_template: Value },
    /// Run `then` when every predicate holds, otherwise `otherwise`
    If {
        predicate_templates: Vec<String>,
        then: ActionSequence,
        otherwise: ActionSequence,
    },
    /// End the run here; a failure when `error` is set
    Stop { reason: String, error: bool },
}

/// An ordered list of steps, executed top to bottom
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSequence {
    steps: Vec<ActionStep>,
}

impl ActionSequence {
    pub fn new(steps: Vec<ActionStep>) -> Self {
        Self { steps }
    }

    /// Parse and compile a script as it appears in configuration
    pub fn from_config(raw: &[Value]) -> ScriptResult<Self> {
        let configs = raw
            .iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<ActionConfig>(value.clone()).map_err(|e| {
                    ScriptError::InvalidAction {
                        index,
                        message: e.to_string(),
                    }
                })
            })
            .collect::<ScriptResult<Vec<_>>>()?;
        Self::compile(&configs)
    }

    pub fn compile(configs: &[ActionConfig]) -> ScriptResult<Self> {
        let mut steps = Vec::with_capacity(configs.len());
        for config in configs {
            compile_action(config, &mut steps)?;
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[ActionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn compile_action(config: &ActionConfig, steps: &mut Vec<ActionStep>) -> ScriptResult<()> {
    match config {
        ActionConfig::Service(service) if service.enabled => {
            if !is_template(&service.service)
                && ServiceCall::parse_service_id(&service.service).is_none()
            {
                return Err(ScriptError::InvalidService(service.service.clone()));
            }
            let mut target = service.entity_id.clone();
            if let Some(t) = &service.target {
                target.extend(t.entity_id.iter().cloned());
            }
            steps.push(ActionStep::ServiceCall {
                service_name: service.service.clone(),
                target,
                data_templates: service.data.clone(),
            });
        }
        ActionConfig::Delay(delay) if delay.enabled => {
            steps.push(ActionStep::Delay {
                duration: compile_delay(&delay.delay)?,
            });
        }
        ActionConfig::Variables(vars) if vars.enabled => {
            steps.extend(vars.variables.iter().map(|(name, value)| {
                ActionStep::SetVariable {
                    name: name.clone(),
                    value_template: value.clone(),
                }
            }));
        }
        ActionConfig::If(branch) if branch.enabled => {
            let predicate_templates = match &branch.r#if {
                Conditions::Template(t) => vec![t.clone()],
                Conditions::List(entries) => entries
                    .iter()
                    .map(|entry| match entry {
                        ConditionEntry::Template(t) => Ok(t.clone()),
                        ConditionEntry::Config(c) => compile_condition(c),
                    })
                    .collect::<ScriptResult<_>>()?,
            };
            steps.push(ActionStep::If {
                predicate_templates,
                then: ActionSequence::compile(&branch.then)?,
                otherwise: ActionSequence::compile(&branch.r#else)?,
            });
        }
        ActionConfig::Stop(stop) if stop.enabled => {
            steps.push(ActionStep::Stop {
                reason: stop.stop.clone(),
                error: stop.error,
            });
        }
        ActionConfig::Condition(cond) if cond.enabled => {
            steps.push(ActionStep::Condition {
                predicate_template: compile_condition(cond)?,
            });
        }
        ActionConfig::Template(text) => {
            if !is_template(text) {
                return Err(ScriptError::InvalidCondition(format!(
                    "'{text}' is neither an action nor a template"
                )));
            }
            steps.push(ActionStep::Condition {
                predicate_template: text.clone(),
            });
        }
        // disabled
        _ => {}
    }
    Ok(())
}

/// Literal delays are checked here; literal components are folded into one
/// number of seconds
fn compile_delay(spec: &DelaySpec) -> ScriptResult<DelayDuration> {
    match spec {
        DelaySpec::Seconds(secs) => {
            Duration::try_from_secs_f64(*secs)
                .map_err(|_| ScriptError::InvalidDelay(secs.to_string()))?;
            Ok(DelayDuration::Text(secs.to_string()))
        }
        DelaySpec::Text(text) if is_template(text) => Ok(DelayDuration::Text(text.clone())),
        DelaySpec::Text(text) => {
            parse_duration(text).ok_or_else(|| ScriptError::InvalidDelay(text.clone()))?;
            Ok(DelayDuration::Text(text.clone()))
        }
        DelaySpec::Components(components) => {
            let parts = components.parts();
            let mut total = Duration::ZERO;
            let mut templated = false;
            for (unit, count) in &parts {
                match count {
                    Value::String(text) if is_template(text) => templated = true,
                    literal => {
                        total = unit
                            .add_to(total, literal)
                            .ok_or_else(|| ScriptError::InvalidDelay(literal.to_string()))?;
                    }
                }
            }
            if templated {
                Ok(DelayDuration::Components(parts))
            } else {
                Ok(DelayDuration::Text(total.as_secs_f64().to_string()))
            }
        }
    }
}

/// Lower a condition config to a single predicate template
fn compile_condition(config: &ConditionConfig) -> ScriptResult<String> {
    match config.condition.as_str() {
        "template" => config.value_template.clone().ok_or_else(|| {
            ScriptError::InvalidCondition("template condition without value_template".into())
        }),
        "state" => {
            if config.entity_id.is_empty() || config.state.is_empty() {
                return Err(ScriptError::InvalidCondition(
                    "state condition needs entity_id and state".into(),
                ));
            }
            let states = Value::from(config.state.clone()).to_string();
            let checks = config
                .entity_id
                .iter()
                .map(|id| {
                    id.parse::<EntityId>()
                        .map_err(|e| ScriptError::InvalidCondition(e.to_string()))?;
                    Ok(format!("is_state({}, {states})", Value::from(id.as_str())))
                })
                .collect::<ScriptResult<Vec<_>>>()?;
            Ok(format!("{{{{ {} }}}}", checks.join(" and ")))
        }
        other => Err(ScriptError::InvalidCondition(format!(
            "unsupported condition type '{other}'"
        ))),
    }
}

/// Parse a duration from seconds, `MM:SS` or `HH:MM:SS`
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Ok(secs) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }

    let parts: Vec<&str> = s.split(':').collect();
    let (hours, mins, secs) = match parts.as_slice() {
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let hours: u64 = hours.trim().parse().ok()?;
    let mins: u64 = mins.trim().parse().ok()?;
    let secs: f64 = secs.trim().parse().ok()?;
    let whole = hours.checked_mul(3600)?.checked_add(mins.checked_mul(60)?)?;
    Duration::from_secs(whole).checked_add(Duration::try_from_secs_f64(secs).ok()?)
}
