//! Script executor
//!
//! Runs a compiled [`ActionSequence`] strictly in order against a private
//! [`ExecutionContext`]. Delays suspend the run on the tokio timer; service
//! calls go through the [`ServiceDispatcher`]. Nothing is retried: the first
//! failing step ends the run.

use crate::action::{parse_duration, ActionSequence, ActionStep, DelayDuration};
use crate::error::StepError;
use indexmap::IndexMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tc_core::{Context, ServiceCall, ServiceDispatcher};
use tc_template::{is_template, Bindings, TemplateInterpreter};
use tracing::{debug, instrument, trace, warn};

/// Variables and call context owned by a single run
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub variables: Bindings,

    /// Parent context for every service call the run makes
    pub context: Context,
}

impl ExecutionContext {
    pub fn new(variables: Bindings) -> Self {
        Self {
            variables,
            context: Context::new(),
        }
    }

    pub fn with_context(variables: Bindings, context: Context) -> Self {
        Self { variables, context }
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: Value) {
        self.variables.insert(key.into(), value);
    }

    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Every step ran
    Completed,
    /// A condition was false or a `stop` step was reached; not an error
    Halted { step: usize, reason: String },
    /// `step` failed; nothing after it ran
    Failed { step: usize, cause: StepError },
}

impl ExecutionResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionResult::Failed { .. })
    }
}

/// Outcome of a single step
enum Flow {
    Continue,
    Halt(String),
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<Flow, StepError>> + Send + 'a>>;

/// Executes action sequences against the template and service collaborators
#[derive(Clone)]
pub struct ScriptExecutor {
    templates: Arc<dyn TemplateInterpreter>,
    services: Arc<dyn ServiceDispatcher>,
}

impl ScriptExecutor {
    pub fn new(
        templates: Arc<dyn TemplateInterpreter>,
        services: Arc<dyn ServiceDispatcher>,
    ) -> Self {
        Self {
            templates,
            services,
        }
    }

    /// Run `sequence` to completion
    ///
    /// Indices in the result refer to top-level steps; a failure inside an
    /// `if` branch is reported at the index of the `if`.
    #[instrument(skip_all, fields(steps = sequence.len()))]
    pub async fn execute(
        &self,
        sequence: &ActionSequence,
        mut ctx: ExecutionContext,
    ) -> ExecutionResult {
        for (index, step) in sequence.steps().iter().enumerate() {
            trace!(index, ?step, "Executing step");
            match self.execute_step(step, &mut ctx).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt(reason)) => {
                    debug!(index, %reason, "Script halted");
                    return ExecutionResult::Halted {
                        step: index,
                        reason,
                    };
                }
                Err(cause) => {
                    warn!(index, error = %cause, "Script step failed");
                    return ExecutionResult::Failed { step: index, cause };
                }
            }
        }
        ExecutionResult::Completed
    }

    /// Run a nested branch; the first halt or failure propagates outward
    fn execute_branch<'a>(
        &'a self,
        sequence: &'a ActionSequence,
        ctx: &'a mut ExecutionContext,
    ) -> StepFuture<'a> {
        Box::pin(async move {
            for step in sequence.steps() {
                if let Flow::Halt(reason) = self.execute_step(step, ctx).await? {
                    return Ok(Flow::Halt(reason));
                }
            }
            Ok(Flow::Continue)
        })
    }

    async fn execute_step(
        &self,
        step: &ActionStep,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow, StepError> {
        match step {
            ActionStep::ServiceCall {
                service_name,
                target,
                data_templates,
            } => self.execute_service(service_name, target, data_templates, ctx).await,
            ActionStep::Delay { duration } => {
                let duration = self.resolve_duration(duration, ctx)?;
                debug!(?duration, "Delaying");
                tokio::time::sleep(duration).await;
                Ok(Flow::Continue)
            }
            ActionStep::Condition { predicate_template } => {
                if self.predicate(predicate_template, ctx)? {
                    Ok(Flow::Continue)
                } else {
                    Ok(Flow::Halt(format!("condition {predicate_template} was false")))
                }
            }
            ActionStep::SetVariable {
                name,
                value_template,
            } => {
                let value = self.render_value(value_template, ctx)?;
                ctx.set_var(name.clone(), value);
                Ok(Flow::Continue)
            }
            ActionStep::If {
                predicate_templates,
                then,
                otherwise,
            } => {
                let mut matched = true;
                for predicate in predicate_templates {
                    if !self.predicate(predicate, ctx)? {
                        matched = false;
                        break;
                    }
                }
                let branch = if matched { then } else { otherwise };
                self.execute_branch(branch, ctx).await
            }
            ActionStep::Stop { reason, error } => {
                if *error {
                    Err(StepError::Stopped(reason.clone()))
                } else {
                    Ok(Flow::Halt(reason.clone()))
                }
            }
        }
    }

    async fn execute_service(
        &self,
        service_name: &str,
        target: &[String],
        data_templates: &IndexMap<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<Flow, StepError> {
        let service_id = match self.render_value(&Value::from(service_name), ctx)? {
            Value::String(s) => s,
            other => return Err(StepError::InvalidService(other.to_string())),
        };
        let (domain, service) = ServiceCall::parse_service_id(&service_id)
            .ok_or_else(|| StepError::InvalidService(service_id.clone()))?;

        let mut data = serde_json::Map::new();
        for (key, value) in data_templates {
            data.insert(key.clone(), self.render_value(value, ctx)?);
        }
        if !target.is_empty() {
            let rendered = target
                .iter()
                .map(|t| self.render_value(&Value::from(t.as_str()), ctx))
                .collect::<Result<Vec<_>, _>>()?;
            data.insert("entity_id".to_string(), Value::Array(rendered));
        }

        debug!(service = %service_id, "Calling service");
        let call = ServiceCall::new(domain, service, Value::Object(data), ctx.context.child());
        self.services.invoke(call).await?;
        Ok(Flow::Continue)
    }

    fn resolve_duration(
        &self,
        delay: &DelayDuration,
        ctx: &ExecutionContext,
    ) -> Result<Duration, StepError> {
        let template = match delay {
            DelayDuration::Text(template) => template,
            DelayDuration::Components(parts) => {
                let mut total = Duration::ZERO;
                for (unit, count) in parts {
                    let count = self.render_value(count, ctx)?;
                    total = unit
                        .add_to(total, &count)
                        .ok_or_else(|| StepError::InvalidDuration(count.to_string()))?;
                }
                return Ok(total);
            }
        };
        let value = self.templates.evaluate(template, &ctx.variables)?;
        let duration = match &value {
            Value::Number(n) => n.as_f64().and_then(|s| Duration::try_from_secs_f64(s).ok()),
            Value::String(s) => parse_duration(s),
            _ => None,
        };
        duration.ok_or_else(|| StepError::InvalidDuration(value.to_string()))
    }

    fn predicate(&self, template: &str, ctx: &ExecutionContext) -> Result<bool, StepError> {
        Ok(is_truthy(&self.templates.evaluate(template, &ctx.variables)?))
    }

    /// Resolve every template string inside `value`
    fn render_value(&self, value: &Value, ctx: &ExecutionContext) -> Result<Value, StepError> {
        match value {
            Value::String(s) if is_template(s) => Ok(self.templates.evaluate(s, &ctx.variables)?),
            Value::Object(obj) => {
                let mut rendered = serde_json::Map::new();
                for (k, v) in obj {
                    rendered.insert(k.clone(), self.render_value(v, ctx)?);
                }
                Ok(Value::Object(rendered))
            }
            Value::Array(arr) => Ok(Value::Array(
                arr.iter()
                    .map(|v| self.render_value(v, ctx))
                    .collect::<Result<_, _>>()?,
            )),
            _ => Ok(value.clone()),
        }
    }
}

/// Truthiness of a resolved predicate
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let trimmed = s.trim().to_lowercase();
            !trimmed.is_empty() && !matches!(trimmed.as_str(), "false" | "no" | "off" | "0" | "none")
        }
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_context() {
        let mut ctx = ExecutionContext::default();
        ctx.set_var("temperature", json!(21));

        assert_eq!(ctx.get_var("temperature"), Some(&json!(21)));
        assert_eq!(ctx.get_var("missing"), None);
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!("on")));
        assert!(is_truthy(&json!("heat")));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!([0])));

        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!("False")));
        assert!(!is_truthy(&json!("off")));
        assert!(!is_truthy(&json!("none")));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!({})));
    }

    #[test]
    fn test_failed_result() {
        let failed = ExecutionResult::Failed {
            step: 0,
            cause: StepError::Stopped("x".into()),
        };
        assert!(failed.is_failed());
        assert!(!ExecutionResult::Completed.is_failed());
    }
}
