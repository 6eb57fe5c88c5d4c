//! Plan validation
//!
//! Two tiers. The fast path pulls a JSON array straight out of the raw
//! planner text and accepts it only if every element is a well-formed step.
//! Only when that yields nothing does the slow path ask the model to repair
//! the text (temperature 0) and re-run the same extraction. A plan is
//! accepted or rejected as a whole.

use crate::llm::ChatModel;
use crate::models::{ChatMessage, PlanStep, ToolArgs};
use crate::prompts::VALIDATOR_PROMPT;
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const REPAIR_TEMPERATURE: f32 = 0.0;

/// Which tier produced the plan
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Parsed(Vec<PlanStep>),
    Repaired(Vec<PlanStep>),
    Unusable,
}

impl ValidationOutcome {
    pub fn steps(&self) -> &[PlanStep] {
        match self {
            ValidationOutcome::Parsed(steps) | ValidationOutcome::Repaired(steps) => steps,
            ValidationOutcome::Unusable => &[],
        }
    }

    pub fn into_steps(self) -> Vec<PlanStep> {
        match self {
            ValidationOutcome::Parsed(steps) | ValidationOutcome::Repaired(steps) => steps,
            ValidationOutcome::Unusable => Vec::new(),
        }
    }
}

pub struct PlanValidator {
    llm: Arc<dyn ChatModel>,
}

impl PlanValidator {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Empty result means "no usable plan", never an error. Only a backend
    /// failure during repair is returned as `Err`.
    pub async fn validate(&self, raw_plan: &str) -> Result<Vec<PlanStep>> {
        Ok(self.validate_detailed(raw_plan).await?.into_steps())
    }

    pub async fn validate_detailed(&self, raw_plan: &str) -> Result<ValidationOutcome> {
        if let Some(steps) = extract_plan(raw_plan) {
            debug!(steps = steps.len(), "Plan accepted on fast path");
            return Ok(ValidationOutcome::Parsed(steps));
        }

        info!("Raw plan is not a well-formed step array, requesting repair");

        let messages = [
            ChatMessage::system(VALIDATOR_PROMPT),
            ChatMessage::user(raw_plan),
        ];
        let repaired = self.llm.chat(&messages, REPAIR_TEMPERATURE).await?;

        match extract_plan(&repaired) {
            Some(steps) => {
                info!(steps = steps.len(), "Plan accepted after repair");
                Ok(ValidationOutcome::Repaired(steps))
            }
            None => {
                warn!("Plan could not be repaired, treating as empty");
                Ok(ValidationOutcome::Unusable)
            }
        }
    }
}

/// Locate a JSON array in `text` and convert it into steps. `None` if no
/// candidate array is non-empty with every element well-formed.
pub fn extract_plan(text: &str) -> Option<Vec<PlanStep>> {
    // Widest span first: first '[' through last ']'
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if start < end {
            if let Some(steps) = serde_json::from_str::<Value>(&text[start..=end])
                .ok()
                .and_then(|value| steps_from_value(&value))
            {
                return Some(steps);
            }
        }
    }

    // Prose after the array: parse the leading value from each '['
    let from_array = text
        .match_indices('[')
        .find_map(|(start, _)| leading_value(&text[start..]).and_then(|v| steps_from_value(&v)));
    if from_array.is_some() {
        return from_array;
    }

    direct_answer_object(text).map(|step| vec![step])
}

/// A bare `{"tool": null, "response": ...}` object is a one-step plan, as
/// long as it is not an element of some array
fn direct_answer_object(text: &str) -> Option<PlanStep> {
    let start = text.find('{')?;
    if text.find('[').map_or(false, |bracket| bracket < start) {
        return None;
    }

    let step = step_from_value(&leading_value(&text[start..])?)?;
    (step.tool.is_none() && step.response.is_some()).then_some(step)
}

fn leading_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()
}

fn steps_from_value(value: &Value) -> Option<Vec<PlanStep>> {
    let elements = value.as_array()?;
    if elements.is_empty() {
        return None;
    }
    elements.iter().map(step_from_value).collect()
}

fn step_from_value(value: &Value) -> Option<PlanStep> {
    let record = value.as_object()?;

    // "null" and "" are how some models spell a missing tool
    let tool = match record.get("tool")? {
        Value::Null => None,
        Value::String(name)
            if name.trim().is_empty() || name.trim().eq_ignore_ascii_case("null") =>
        {
            None
        }
        Value::String(name) => Some(name.clone()),
        _ => return None,
    };

    let response = match record.get("response") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    };

    // A direct-answer record needs no args
    let args = match record.get("args") {
        Some(Value::Object(args)) => args.clone(),
        Some(Value::Null) => ToolArgs::new(),
        Some(_) => return None,
        None if tool.is_none() && response.is_some() => ToolArgs::new(),
        None => return None,
    };

    let index = record.get("step").and_then(|step| match step {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    let description = record
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(PlanStep {
        index,
        tool,
        args,
        description,
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use serde_json::json;

    fn validator(replies: &[&str]) -> (Arc<ScriptedModel>, PlanValidator) {
        let llm = Arc::new(ScriptedModel::new(replies.iter().copied()));
        (llm.clone(), PlanValidator::new(llm))
    }

    #[tokio::test]
    async fn test_fast_path_returns_plan_unchanged() {
        let plan = json!([
            {"step": 1, "tool": "fetch_url", "args": {"url": "https://example.com", "depth": 2}, "description": "Fetch"},
            {"step": 2, "tool": "word_count", "args": {"text": "PREVIOUS_RESULT", "nested": {"keep": [1, 2]}}, "description": "Count"}
        ]);
        let (llm, validator) = validator(&[]);

        let steps = validator.validate(&plan.to_string()).await.unwrap();

        assert_eq!(llm.calls(), 0);
        assert_eq!(serde_json::to_value(&steps).unwrap(), plan);
    }

    #[tokio::test]
    async fn test_fast_path_handles_fences_and_prose() {
        let raw = "Sure! Here is the plan:\n```json\n[{\"step\": 1, \"tool\": \"echo\", \"args\": {\"msg\": \"hi\"}, \"description\": \"\"}]\n```\nLet me know [if] you need more.";
        let (llm, validator) = validator(&[]);

        let outcome = validator.validate_detailed(raw).await.unwrap();

        assert_eq!(llm.calls(), 0);
        assert!(matches!(outcome, ValidationOutcome::Parsed(_)));
        assert_eq!(outcome.steps()[0].dispatch_target(), Some("echo"));
    }

    #[tokio::test]
    async fn test_direct_answer_record_is_well_formed() {
        let (llm, validator) = validator(&[]);
        let steps = validator
            .validate(r#"[{"step": 1, "tool": null, "response": "42"}]"#)
            .await
            .unwrap();

        assert_eq!(llm.calls(), 0);
        assert_eq!(steps, vec![PlanStep::direct_answer("42")]);
    }

    #[tokio::test]
    async fn test_null_tool_string_is_a_direct_answer() {
        let (llm, validator) = validator(&[]);
        let steps = validator
            .validate(r#"[{"step": 1, "tool": "null", "response": "42"}]"#)
            .await
            .unwrap();

        assert_eq!(llm.calls(), 0);
        assert_eq!(steps, vec![PlanStep::direct_answer("42")]);
    }

    #[tokio::test]
    async fn test_bare_direct_answer_object_is_accepted() {
        let (llm, validator) = validator(&[]);
        let outcome = validator
            .validate_detailed("```json\n{\"step\": 1, \"tool\": null, \"response\": \"42\"}\n```")
            .await
            .unwrap();

        assert_eq!(llm.calls(), 0);
        assert_eq!(outcome, ValidationOutcome::Parsed(vec![PlanStep::direct_answer("42")]));
    }

    #[tokio::test]
    async fn test_slow_path_repairs_broken_json() {
        let broken = "[{'step': 1, 'tool': 'echo', 'args': {'msg': 'hi'},}]";
        let fixed = r#"[{"step": 1, "tool": "echo", "args": {"msg": "hi"}, "description": "Echo"}]"#;
        let (llm, validator) = validator(&[fixed]);

        let outcome = validator.validate_detailed(broken).await.unwrap();

        assert!(matches!(outcome, ValidationOutcome::Repaired(ref steps) if steps.len() == 1));
        assert_eq!(llm.calls(), 1);
        let (messages, temperature) = llm.request(0);
        assert_eq!(temperature, 0.0);
        assert_eq!(messages[1].content, broken);
    }

    #[tokio::test]
    async fn test_garbage_yields_empty_plan() {
        let (llm, validator) = validator(&["I could not find any plan in that."]);

        let steps = validator.validate("not json at all").await.unwrap();

        assert!(steps.is_empty());
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_partially_malformed_plan_is_rejected_wholesale() {
        // second element lacks args, so the whole array is rejected
        let raw = r#"[{"tool": "echo", "args": {"msg": "a"}}, {"tool": "echo"}]"#;
        let (llm, validator) = validator(&["[]"]);

        let outcome = validator.validate_detailed(raw).await.unwrap();

        assert_eq!(outcome, ValidationOutcome::Unusable);
        assert_eq!(llm.calls(), 1);
    }

    #[test]
    fn test_extract_plan_edge_cases() {
        assert!(extract_plan("[]").is_none());
        assert!(extract_plan("{\"tool\": \"echo\", \"args\": {}}").is_none());
        assert!(extract_plan("[1, 2, 3]").is_none());
        assert!(extract_plan(r#"{"tool": "echo", "response": "hi"}"#).is_none());
        assert!(extract_plan(r#"[{"tool": null, "response": "a"}, {"tool": "echo"}]"#).is_none());
        assert!(extract_plan(r#"[{"tool": "echo", "args": "msg=hi"}]"#).is_none());

        let steps = extract_plan(r#"[{"step": "3", "tool": "echo", "args": null}]"#).unwrap();
        assert_eq!(steps[0].index, Some(3));
        assert!(steps[0].args.is_empty());
    }
}
