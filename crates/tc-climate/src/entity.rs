//! The climate entity facade
//!
//! Reads go through [`ClimateEntity::poll`], which resolves every public
//! attribute against a single evaluation cycle. Writes go through
//! [`ClimateEntity::invoke`] or one of the standard climate service methods.

use crate::attributes::{read_attribute, resolve_in_cycle, AttributeValue};
use crate::context::{self, EvaluationCycle};
use crate::dispatch::{route, CommandStatus, DispatchOutcome};
use crate::error::{ClimateError, ClimateResult};
use crate::fallback::{delegate_dispatch, delegate_read, BaseCapabilities};
use crate::features::{ClimateEntityFeature, DispatchKind};
use crate::platform::Host;
use crate::resolver;
use crate::spec::{ClimateEntitySpec, STATE_ATTRIBUTE};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tc_core::{Context, EntityId, State, STATE_UNAVAILABLE, STATE_UNKNOWN};
use tc_script::{is_truthy, ExecutionContext, ExecutionResult, ScriptExecutor};
use tc_template::Bindings;
use tracing::{debug, error, instrument, warn};

/// Everything one poll produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateSnapshot {
    pub entity_id: EntityId,
    pub available: bool,
    pub state: AttributeValue,
    pub attributes: IndexMap<String, AttributeValue>,
}

impl ClimateSnapshot {
    fn unavailable(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            available: false,
            state: AttributeValue::Unavailable,
            attributes: IndexMap::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// The state as the host displays it
    pub fn state_string(&self) -> String {
        match &self.state {
            AttributeValue::Value(Value::String(s)) => s.clone(),
            AttributeValue::Value(Value::Null) => STATE_UNKNOWN.to_string(),
            AttributeValue::Value(other) => other.to_string(),
            AttributeValue::Unavailable => STATE_UNAVAILABLE.to_string(),
        }
    }

    /// Convert into a host state for publishing
    pub fn to_state(&self, context: Context) -> State {
        let attributes: HashMap<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into_value()))
            .collect();
        State::new(self.entity_id.clone(), self.state_string(), attributes, context)
    }
}

/// Arguments of `set_temperature`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemperatureRequest {
    pub temperature: Option<f64>,
    pub target_temp_high: Option<f64>,
    pub target_temp_low: Option<f64>,
    pub hvac_mode: Option<String>,
}

impl TemperatureRequest {
    pub fn target(temperature: f64) -> Self {
        Self {
            temperature: Some(temperature),
            ..Default::default()
        }
    }

    pub fn range(low: f64, high: f64) -> Self {
        Self {
            target_temp_low: Some(low),
            target_temp_high: Some(high),
            ..Default::default()
        }
    }

    fn into_params(self) -> Bindings {
        let mut params = Bindings::new();
        let numbers = [
            ("temperature", self.temperature),
            ("target_temp_high", self.target_temp_high),
            ("target_temp_low", self.target_temp_low),
        ];
        for (name, value) in numbers {
            if let Some(value) = value {
                params.insert(name.to_string(), json!(value));
            }
        }
        if let Some(mode) = self.hvac_mode {
            params.insert("hvac_mode".to_string(), Value::String(mode));
        }
        params
    }
}

/// A synthesized climate entity
pub struct ClimateEntity {
    spec: Arc<ClimateEntitySpec>,
    host: Host,
    executor: ScriptExecutor,
    capabilities: RwLock<Arc<BaseCapabilities>>,
}

impl ClimateEntity {
    /// Create the entity, reading base capabilities once
    pub fn new(spec: Arc<ClimateEntitySpec>, host: Host) -> Self {
        let capabilities = Arc::new(read_capabilities(&spec, &host));
        let executor = ScriptExecutor::new(host.templates.clone(), host.services.clone());
        Self {
            spec,
            host,
            executor,
            capabilities: RwLock::new(capabilities),
        }
    }

    pub fn spec(&self) -> &Arc<ClimateEntitySpec> {
        &self.spec
    }

    pub fn entity_id(&self) -> &EntityId {
        self.spec.entity_id()
    }

    pub fn unique_id(&self) -> &str {
        self.spec.unique_id()
    }

    /// Base capabilities as last read
    pub fn capabilities(&self) -> Arc<BaseCapabilities> {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the base entity's capabilities
    pub fn refresh_capabilities(&self) {
        let fresh = Arc::new(read_capabilities(&self.spec, &self.host));
        *self
            .capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    /// Local features plus the base's
    pub fn supported_features(&self) -> ClimateEntityFeature {
        self.spec.local_features() | self.capabilities().features()
    }

    /// Advertised keys of one kind: local keys, then base keys not already listed
    pub fn modes(&self, kind: DispatchKind) -> Vec<String> {
        let mut modes: Vec<String> = self.spec.dispatch().keys(kind).map(str::to_string).collect();
        for mode in self.capabilities().modes(kind) {
            if !modes.contains(mode) {
                modes.push(mode.clone());
            }
        }
        modes
    }

    /// Read a single attribute outside of a poll
    ///
    /// Returns `None` when the attribute is neither templated nor inherited.
    pub fn read(&self, name: &str) -> Option<AttributeValue> {
        let cycle = EvaluationCycle::begin(&self.spec, self.host.templates.as_ref(), &Bindings::new());
        match read_attribute(&self.spec, self.host.templates.as_ref(), &cycle, name) {
            DispatchOutcome::Resolved(result) => Some(self.settle(name, result)),
            DispatchOutcome::Delegated(base) => Some(delegate_read(self.host.states.as_ref(), &base, name)),
            DispatchOutcome::Unsupported => None,
        }
    }

    /// Resolve state and every public attribute
    #[instrument(skip(self), fields(entity_id = %self.spec.entity_id()))]
    pub fn poll(&self) -> ClimateSnapshot {
        let spec = &self.spec;
        let templates = self.host.templates.as_ref();
        let cycle = EvaluationCycle::begin(spec, templates, &Bindings::new());
        if let Err(err) = cycle.variables() {
            warn!(error = %err, "Variables failed; templated attributes are unavailable this cycle");
        }

        if let Some(template) = spec.availability() {
            if !self.is_available(&cycle, template) {
                debug!("Entity is unavailable");
                return ClimateSnapshot::unavailable(spec.entity_id().clone());
            }
        }

        let state = match read_attribute(spec, templates, &cycle, STATE_ATTRIBUTE) {
            DispatchOutcome::Resolved(result) => self.settle(STATE_ATTRIBUTE, result),
            DispatchOutcome::Delegated(base) => {
                delegate_read(self.host.states.as_ref(), &base, STATE_ATTRIBUTE)
            }
            DispatchOutcome::Unsupported => AttributeValue::Value(Value::String(STATE_UNKNOWN.to_string())),
        };

        let mut attributes = IndexMap::new();

        if let Some(base) = spec.base_entity() {
            if let Some(base_state) = self.host.states.get_state(&base.to_string()) {
                let mut inherited: Vec<_> = base_state.attributes.into_iter().collect();
                inherited.sort_by(|a, b| a.0.cmp(&b.0));
                for (name, value) in inherited {
                    attributes.insert(name, AttributeValue::Value(value));
                }
            }
        }

        attributes.insert(
            "supported_features".to_string(),
            AttributeValue::Value(json!(self.supported_features().bits())),
        );
        for kind in DispatchKind::MODES {
            let modes = self.modes(kind);
            if kind == DispatchKind::HvacMode || !modes.is_empty() {
                if let Some(list) = kind.list_attribute() {
                    attributes.insert(list.to_string(), AttributeValue::Value(json!(modes)));
                }
            }
        }

        let name = resolve_in_cycle(templates, &cycle, "friendly_name", spec.friendly_name());
        attributes.insert("friendly_name".to_string(), self.settle("friendly_name", name));
        if let Some(icon) = spec.icon() {
            let icon = resolve_in_cycle(templates, &cycle, "icon", icon);
            attributes.insert("icon".to_string(), self.settle("icon", icon));
        }
        if let Some(device_class) = spec.device_class() {
            attributes.insert("device_class".to_string(), AttributeValue::Value(json!(device_class)));
        }
        if let Some(unit) = spec.temperature_unit() {
            attributes.insert("temperature_unit".to_string(), AttributeValue::Value(json!(unit)));
        }

        for name in spec.attribute_names() {
            if let DispatchOutcome::Resolved(result) = read_attribute(spec, templates, &cycle, name) {
                attributes.insert(name.to_string(), self.settle(name, result));
            }
        }

        ClimateSnapshot {
            entity_id: spec.entity_id().clone(),
            available: true,
            state,
            attributes,
        }
    }

    /// Resolve the availability template for one cycle
    ///
    /// After a variable failure a template that reads none of the variables
    /// is resolved without them; one that reads them leaves the entity
    /// available, so inherited attributes still show.
    fn is_available(&self, cycle: &EvaluationCycle, template: &Value) -> bool {
        let templates = self.host.templates.as_ref();
        let result = match cycle.variables() {
            Ok(_) => resolve_in_cycle(templates, cycle, "availability", template),
            Err(_) if self.reads_variables(template) => {
                debug!("Availability depends on failed variables; left unchanged");
                return true;
            }
            Err(_) => {
                let context = cycle.seed_for("availability");
                resolver::resolve(templates, template, context.bindings()).map_err(ClimateError::from)
            }
        };
        match result {
            Ok(value) => is_truthy(&value),
            Err(err) => {
                warn!(error = %err, "Availability template failed");
                false
            }
        }
    }

    fn reads_variables(&self, template: &Value) -> bool {
        match resolver::referenced_names(self.host.templates.as_ref(), template) {
            Ok(names) => self
                .spec
                .variables()
                .iter()
                .any(|decl| names.contains(&decl.name)),
            Err(_) => true,
        }
    }

    /// Dispatch a command with a fresh root context
    pub async fn invoke(
        &self,
        kind: DispatchKind,
        key: &str,
        params: Bindings,
    ) -> ClimateResult<CommandStatus> {
        self.invoke_with_context(kind, key, params, Context::new()).await
    }

    /// Dispatch a command: local script, else base entity, else unsupported
    ///
    /// Mode commands bind the requested mode (`hvac_mode`, `preset_mode`, ...)
    /// for the script. A halted script is a success.
    #[instrument(skip(self, params, context), fields(entity_id = %self.spec.entity_id()))]
    pub async fn invoke_with_context(
        &self,
        kind: DispatchKind,
        key: &str,
        mut params: Bindings,
        context: Context,
    ) -> ClimateResult<CommandStatus> {
        let spec = Arc::clone(&self.spec);
        let capabilities = self.capabilities();

        match route(&spec, &capabilities, kind, key) {
            DispatchOutcome::Resolved(sequence) => {
                if kind != DispatchKind::Service {
                    params.insert(kind.as_str().to_string(), Value::String(key.to_string()));
                }
                let variables = context::build(&spec, self.host.templates.as_ref(), &params, None)?;
                let run = ExecutionContext::with_context(variables.into_bindings(), context);

                match self.executor.execute(sequence, run).await {
                    ExecutionResult::Completed => Ok(CommandStatus::Completed),
                    ExecutionResult::Halted { reason, .. } => Ok(CommandStatus::Halted { reason }),
                    ExecutionResult::Failed { step, cause } => {
                        let err = ClimateError::DispatchFailure {
                            kind,
                            key: key.to_string(),
                            step,
                            cause,
                        };
                        error!(error = %err, "Command failed");
                        Err(err)
                    }
                }
            }
            DispatchOutcome::Delegated(base) => {
                delegate_dispatch(self.host.services.as_ref(), &base, kind, key, &params, context).await?;
                Ok(CommandStatus::Delegated)
            }
            DispatchOutcome::Unsupported => {
                debug!(%kind, key, "Unsupported command");
                Err(ClimateError::Unsupported {
                    kind,
                    key: key.to_string(),
                })
            }
        }
    }

    pub async fn turn_on(&self) -> ClimateResult<CommandStatus> {
        self.invoke(DispatchKind::Service, "turn_on", Bindings::new()).await
    }

    pub async fn turn_off(&self) -> ClimateResult<CommandStatus> {
        self.invoke(DispatchKind::Service, "turn_off", Bindings::new()).await
    }

    /// Run the `toggle` script or base service; otherwise turn off unless off
    pub async fn toggle(&self) -> ClimateResult<CommandStatus> {
        match self.invoke(DispatchKind::Service, "toggle", Bindings::new()).await {
            Err(ClimateError::Unsupported { .. }) => {
                if self.poll().state_string() == "off" {
                    self.turn_on().await
                } else {
                    self.turn_off().await
                }
            }
            result => result,
        }
    }

    pub async fn set_temperature(&self, request: TemperatureRequest) -> ClimateResult<CommandStatus> {
        self.invoke(DispatchKind::Service, "set_temperature", request.into_params())
            .await
    }

    pub async fn set_humidity(&self, humidity: f64) -> ClimateResult<CommandStatus> {
        let mut params = Bindings::new();
        params.insert("humidity".to_string(), json!(humidity));
        self.invoke(DispatchKind::Service, "set_humidity", params).await
    }

    pub async fn set_hvac_mode(&self, mode: &str) -> ClimateResult<CommandStatus> {
        self.invoke(DispatchKind::HvacMode, mode, Bindings::new()).await
    }

    pub async fn set_preset_mode(&self, mode: &str) -> ClimateResult<CommandStatus> {
        self.invoke(DispatchKind::PresetMode, mode, Bindings::new()).await
    }

    pub async fn set_fan_mode(&self, mode: &str) -> ClimateResult<CommandStatus> {
        self.invoke(DispatchKind::FanMode, mode, Bindings::new()).await
    }

    pub async fn set_swing_mode(&self, mode: &str) -> ClimateResult<CommandStatus> {
        self.invoke(DispatchKind::SwingMode, mode, Bindings::new()).await
    }

    pub async fn set_swing_horizontal_mode(&self, mode: &str) -> ClimateResult<CommandStatus> {
        self.invoke(DispatchKind::SwingHorizontalMode, mode, Bindings::new())
            .await
    }

    /// Turn a local resolution into a public value, logging failures
    fn settle(&self, name: &str, result: ClimateResult<Value>) -> AttributeValue {
        match result {
            Ok(value) => AttributeValue::Value(value),
            Err(err) => {
                warn!(entity_id = %self.spec.entity_id(), attribute = name, error = %err, "Attribute unavailable this cycle");
                AttributeValue::Unavailable
            }
        }
    }
}

impl std::fmt::Debug for ClimateEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClimateEntity")
            .field("entity_id", &self.spec.entity_id().to_string())
            .field("unique_id", &self.spec.unique_id())
            .finish_non_exhaustive()
    }
}

fn read_capabilities(spec: &ClimateEntitySpec, host: &Host) -> BaseCapabilities {
    match spec.base_entity() {
        Some(base) => BaseCapabilities::read(host.states.as_ref(), base),
        None => BaseCapabilities::default(),
    }
}
