//! Core data models for the agent pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Literal token replaced with the previous step's result during execution
pub const PREVIOUS_RESULT_TOKEN: &str = "PREVIOUS_RESULT";

//
// ================= Chat =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Which model-serving endpoint a client instance is bound to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Local,
    Remote,
}

//
// ================= Plan =================
//

/// Flat string-keyed argument mapping passed to a capability
pub type ToolArgs = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// Informational ordinal as emitted by the planner
    #[serde(rename = "step", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    /// `None` means the step is a direct answer carried in `response`
    pub tool: Option<String>,
    #[serde(default)]
    pub args: ToolArgs,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl PlanStep {
    pub fn tool_call(tool: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            index: None,
            tool: Some(tool.into()),
            args,
            description: String::new(),
            response: None,
        }
    }

    pub fn direct_answer(response: impl Into<String>) -> Self {
        Self {
            index: Some(1),
            tool: None,
            args: ToolArgs::new(),
            description: String::new(),
            response: Some(response.into()),
        }
    }

    /// Name of the capability to dispatch to, if this step names a real one.
    /// Missing names, empty names and the stray `"step"` marker some models
    /// emit do not count.
    pub fn dispatch_target(&self) -> Option<&str> {
        match self.tool.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() && name != "step" && name != "null" => Some(name),
            _ => None,
        }
    }
}

//
// ================= Execution =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Output(String),
    ToolNotFound,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub index: Option<u64>,
    pub tool: String,
    pub outcome: StepOutcome,
}

impl StepResult {
    pub fn is_error(&self) -> bool {
        !matches!(self.outcome, StepOutcome::Output(_))
    }

    /// Textual form used for carry substitution and summarization
    pub fn text(&self) -> String {
        match &self.outcome {
            StepOutcome::Output(text) => text.clone(),
            StepOutcome::ToolNotFound => format!("Error: Tool '{}' not found.", self.tool),
            StepOutcome::Failed(message) => {
                format!("Error executing {}: {}", self.tool, message)
            }
        }
    }
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl QueryResponse {
    pub fn text(content: impl Into<String>, mode: Option<BackendMode>) -> Self {
        Self {
            kind: "text".to_string(),
            content: content.into(),
            mode: mode.map(|m| m.to_string()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendMode::Local => "local",
            BackendMode::Remote => "remote",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}
