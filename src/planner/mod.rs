//! Planner
//!
//! One model call turning user intent plus the tool catalogue into a raw
//! plan string. No parsing happens here: fenced JSON, broken JSON and plain
//! prose are all valid outputs and are the validator's problem.

use crate::llm::ChatModel;
use crate::models::ChatMessage;
use crate::prompts::PLANNER_PROMPT;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

const PLANNER_TEMPERATURE: f32 = 0.09;

pub struct Planner {
    llm: Arc<dyn ChatModel>,
}

impl Planner {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    fn build_messages(user_text: &str, tool_descriptions: &str) -> Vec<ChatMessage> {
        let catalogue = if tool_descriptions.trim().is_empty() {
            "(no tools available)"
        } else {
            tool_descriptions
        };

        vec![
            ChatMessage::system(PLANNER_PROMPT.replace("{tools}", catalogue)),
            ChatMessage::user(user_text),
        ]
    }

    pub async fn plan(&self, user_text: &str, tool_descriptions: &str) -> Result<String> {
        let messages = Self::build_messages(user_text, tool_descriptions);
        let raw = self.llm.chat(&messages, PLANNER_TEMPERATURE).await?;

        debug!(raw_plan = %raw, "Planner produced raw plan");

        Ok(raw)
    }
}
