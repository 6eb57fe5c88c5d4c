//! Main orchestrator
//!
//! PRE-PROCESS → PLAN → (DIRECT-ANSWER | EXECUTE → SUMMARIZE) → DONE
//!
//! `execute_query` never fails: any backend error is rendered into the
//! response text.

use crate::config::AgentConfig;
use crate::execution::ExecutionEngine;
use crate::llm::{ChatModel, LlmClient};
use crate::models::{BackendMode, ChatMessage, QueryResponse};
use crate::planner::Planner;
use crate::prompts::REWRITE_PROMPT;
use crate::summarizer::Summarizer;
use crate::tools::{create_default_registry, ToolRegistry};
use crate::validator::PlanValidator;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

const REWRITE_TEMPERATURE: f32 = 0.0;
const DIRECT_TEMPERATURE: f32 = 0.7;
const NO_RESPONSE_MESSAGE: &str = "No response generated.";

/// Shared, read-only dependencies of the pipeline
#[derive(Clone)]
pub struct AgentContext {
    pub llm: Arc<dyn ChatModel>,
    pub registry: Arc<ToolRegistry>,
}

impl AgentContext {
    pub fn new(llm: Arc<dyn ChatModel>, registry: Arc<ToolRegistry>) -> Self {
        Self { llm, registry }
    }
}

/// Coordinates planner, validator, executor and summarizer for one query
pub struct Orchestrator {
    context: AgentContext,
    planner: Planner,
    validator: PlanValidator,
    execution_engine: ExecutionEngine,
    summarizer: Summarizer,
    rewrite_query: bool,
}

impl Orchestrator {
    pub fn new(context: AgentContext, rewrite_query: bool) -> Self {
        Self {
            planner: Planner::new(context.llm.clone()),
            validator: PlanValidator::new(context.llm.clone()),
            execution_engine: ExecutionEngine::new(context.registry.clone()),
            summarizer: Summarizer::new(context.llm.clone()),
            context,
            rewrite_query,
        }
    }

    /// Production wiring: `LlmClient` plus the default tool registry
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let llm = Arc::new(LlmClient::from_config(&config.llm)?);
        let registry = Arc::new(create_default_registry()?);

        info!(
            tools = registry.len(),
            prefer_local = config.llm.prefer_local,
            rewrite_query = config.rewrite_query,
            "Orchestrator initialized"
        );

        Ok(Self::new(
            AgentContext::new(llm, registry),
            config.rewrite_query,
        ))
    }

    /// Backend mode of the underlying model client, probing if undecided
    pub async fn backend_mode(&self) -> Option<BackendMode> {
        self.context.llm.resolve_backend().await
    }

    pub async fn execute_query(&self, text: &str) -> QueryResponse {
        let query_id = Uuid::new_v4();
        let span = info_span!("query", %query_id);
        let start = Instant::now();

        match self.run(text).instrument(span).await {
            Ok(content) => {
                info!(
                    %query_id,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query completed"
                );
                QueryResponse::text(content, self.context.llm.backend_mode())
            }
            Err(e) => {
                error!(%query_id, error = %e, "Agent execution failed");
                QueryResponse::text(format!("**Agent Execution Error:** {}", e), None)
            }
        }
    }

    async fn run(&self, text: &str) -> Result<String> {
        info!(query = %text, "Orchestrator: starting execution");

        // === PRE-PROCESS ===
        let planning_text = if self.rewrite_query {
            self.rewrite(text).await?
        } else {
            text.to_string()
        };

        // === PLAN ===
        let raw_plan = self
            .planner
            .plan(&planning_text, &self.context.registry.describe_all())
            .await?;
        let steps = self.validator.validate(&raw_plan).await?;

        debug!(step_count = steps.len(), "Plan validated");

        if let Some(first) = steps.first() {
            if first.tool.is_none() {
                info!("Planner answered directly");
                return Ok(first
                    .response
                    .clone()
                    .unwrap_or_else(|| NO_RESPONSE_MESSAGE.to_string()));
            }

            // === EXECUTE ===
            let results = self.execution_engine.execute_plan(&steps).await;

            // === SUMMARIZE ===
            return self.summarizer.summarize(text, &results).await;
        }

        // === NO USABLE PLAN ===
        if serde_json::from_str::<serde_json::Value>(strip_fences(&raw_plan)).is_err() {
            info!("Planner output is not JSON, using it as the answer");
            return Ok(raw_plan);
        }

        info!("Plan was empty, answering with a direct model call");
        self.context
            .llm
            .chat(&[ChatMessage::user(text)], DIRECT_TEMPERATURE)
            .await
    }

    async fn rewrite(&self, text: &str) -> Result<String> {
        let prompt = format!("{}{}", REWRITE_PROMPT, text);
        let rewritten = self
            .context
            .llm
            .chat(&[ChatMessage::user(prompt)], REWRITE_TEMPERATURE)
            .await?;
        let rewritten = rewritten.trim();

        if rewritten.is_empty() {
            return Ok(text.to_string());
        }

        debug!(original = %text, rewritten = %rewritten, "Query rewritten");
        Ok(rewritten.to_string())
    }
}

/// Drop a surrounding markdown code fence, if any
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // skip the language tag line
    let body = match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => body,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
