//! Execution engine for validated plans
//!
//! Steps run strictly in order. Every per-step problem becomes a
//! `StepResult`; the plan always runs to the end.

use crate::models::{PlanStep, StepOutcome, StepResult, ToolArgs, PREVIOUS_RESULT_TOKEN};
use crate::tools::{Capability, ParamKind, ToolRegistry};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Executes a plan step-by-step, threading each result into the next step
pub struct ExecutionEngine {
    tool_registry: Arc<ToolRegistry>,
}

impl ExecutionEngine {
    pub fn new(tool_registry: Arc<ToolRegistry>) -> Self {
        Self { tool_registry }
    }

    pub async fn execute_plan(&self, steps: &[PlanStep]) -> Vec<StepResult> {
        let mut results = Vec::with_capacity(steps.len());
        let mut carry = Value::String(String::new());

        debug!(step_count = steps.len(), "Starting plan execution");

        for step in steps {
            let Some(tool_name) = step.dispatch_target() else {
                debug!(step = ?step.index, "Skipping step without a tool");
                continue;
            };

            let Some(capability) = self.tool_registry.resolve(tool_name) else {
                warn!(step = ?step.index, tool_name, "Tool not registered");

                let result = StepResult {
                    index: step.index,
                    tool: tool_name.to_string(),
                    outcome: StepOutcome::ToolNotFound,
                };
                carry = Value::String(result.text());
                results.push(result);
                continue;
            };

            let args = substitute_previous_result(&step.args, &carry, capability);
            let start = Instant::now();

            let outcome = match AssertUnwindSafe(capability.invoke(args))
                .catch_unwind()
                .await
            {
                Ok(Ok(value)) => {
                    let output = stringify(&value);
                    carry = value;
                    StepOutcome::Output(output)
                }
                Ok(Err(e)) => StepOutcome::Failed(e.to_string()),
                Err(panic) => StepOutcome::Failed(panic_message(panic.as_ref())),
            };

            let result = StepResult {
                index: step.index,
                tool: tool_name.to_string(),
                outcome,
            };

            if result.is_error() {
                warn!(
                    step = ?step.index,
                    tool_name,
                    error = %result.text(),
                    "Tool execution failed"
                );
                carry = Value::String(result.text());
            } else {
                debug!(
                    step = ?step.index,
                    tool_name,
                    execution_time_ms = start.elapsed().as_millis() as u64,
                    "Step completed"
                );
            }

            results.push(result);
        }

        debug!(result_count = results.len(), "Plan execution completed");

        results
    }
}

/// Replace the token inside every top-level string argument with the
/// stringified carry. An argument that is exactly the token and declared
/// `json` receives a structured carry as-is.
fn substitute_previous_result(args: &ToolArgs, carry: &Value, capability: &Capability) -> ToolArgs {
    args.iter()
        .map(|(key, value)| {
            let substituted = match value {
                Value::String(text) if text == PREVIOUS_RESULT_TOKEN && wants_structured(capability, key, carry) => {
                    carry.clone()
                }
                Value::String(text) if text.contains(PREVIOUS_RESULT_TOKEN) => {
                    Value::String(text.replace(PREVIOUS_RESULT_TOKEN, &stringify(carry)))
                }
                other => other.clone(),
            };
            (key.clone(), substituted)
        })
        .collect()
}

fn wants_structured(capability: &Capability, key: &str, carry: &Value) -> bool {
    !carry.is_string()
        && capability
            .param(key)
            .map_or(false, |param| param.kind == ParamKind::Json)
}

/// Strings verbatim, anything else as compact JSON
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
