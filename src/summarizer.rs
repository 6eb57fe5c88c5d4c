//! Final answer generation
//!
//! Failed steps are dropped before prompting so the answer is not anchored
//! on error text. With nothing left, a fixed message is returned and the
//! model is not called.

use crate::llm::ChatModel;
use crate::models::{ChatMessage, StepResult};
use crate::prompts::{summarizer_prompt, SUMMARIZER_SYSTEM_PROMPT};
use crate::tools::builtin::truncate_chars;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub const NO_RESULTS_MESSAGE: &str = "No results could be retrieved. Please try again.";

const SUMMARIZER_TEMPERATURE: f32 = 0.5;
const MAX_RESULT_CHARS: usize = 2000;

pub struct Summarizer {
    llm: Arc<dyn ChatModel>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    pub async fn summarize(&self, task: &str, results: &[StepResult]) -> Result<String> {
        let usable: Vec<&StepResult> = results.iter().filter(|r| !r.is_error()).collect();

        if usable.is_empty() {
            warn!(
                result_count = results.len(),
                "No usable step results, skipping summarization"
            );
            return Ok(NO_RESULTS_MESSAGE.to_string());
        }

        info!(
            usable = usable.len(),
            dropped = results.len() - usable.len(),
            "Summarizing step results"
        );

        let messages = [
            ChatMessage::system(SUMMARIZER_SYSTEM_PROMPT),
            ChatMessage::user(Self::build_prompt(task, &usable)),
        ];

        self.llm.chat(&messages, SUMMARIZER_TEMPERATURE).await
    }

    fn build_prompt(task: &str, results: &[&StepResult]) -> String {
        let results_text = results
            .iter()
            .enumerate()
            .map(|(i, result)| {
                format!(
                    "--- Result {} ---\n{}",
                    i + 1,
                    truncate_chars(&result.text(), MAX_RESULT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        summarizer_prompt(task, &results_text)
    }
}
