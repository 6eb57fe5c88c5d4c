//! Agent Orchestrator
//!
//! Answers natural-language requests by:
//! - Planning a sequence of tool calls with a language model
//! - Validating (and if needed, repairing) the raw plan into typed steps
//! - Executing steps in order, threading each result into the next
//! - Summarizing the successful results into a final answer
//!
//! The model client prefers a local OpenAI-compatible server and falls back
//! to Gemini, with bounded backoff on rate limits.
//!
//! PIPELINE:
//! INPUT → (REWRITE) → PLAN → VALIDATE → EXECUTE → SUMMARIZE → ANSWER

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod models;
pub mod planner;
pub mod prompts;
pub mod summarizer;
pub mod tools;
pub mod validator;

pub use error::Result;

// Re-export common types
pub use agent::{AgentContext, Orchestrator};
pub use models::*;
