//! Environment-driven configuration
//!
//! `.env` is loaded by the binaries through `dotenv`; everything here reads
//! plain process environment so tests can build configs directly.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LOCAL_URL: &str = "http://localhost:8080/v1";
const DEFAULT_LOCAL_MODEL: &str = "Phi-3-mini-4k-instruct";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Bounded exponential backoff applied when a backend reports rate limiting
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(45),
            max_delay: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub prefer_local: bool,
    pub local_url: String,
    pub local_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            prefer_local: true,
            local_url: DEFAULT_LOCAL_URL.to_string(),
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    /// Rewrite company names into tickers before planning
    pub rewrite_query: bool,
    pub api_port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            rewrite_query: false,
            api_port: 8080,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = LlmConfig::default();
        let retry_defaults = RetryPolicy::default();

        let llm = LlmConfig {
            prefer_local: parse_flag("PREFER_LOCAL_LLM", defaults.prefer_local)?,
            local_url: env::var("LOCAL_LLM_URL")
                .unwrap_or(defaults.local_url)
                .trim_end_matches('/')
                .to_string(),
            local_model: env::var("LOCAL_LLM_MODEL").unwrap_or(defaults.local_model),
            gemini_api_key: env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or(defaults.gemini_base_url)
                .trim_end_matches('/')
                .to_string(),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            request_timeout: Duration::from_secs(parse_var(
                "LLM_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            retry: RetryPolicy {
                max_attempts: parse_var("LLM_MAX_RETRIES", retry_defaults.max_attempts)?.max(1),
                base_delay: Duration::from_secs(parse_var(
                    "LLM_BACKOFF_SECS",
                    retry_defaults.base_delay.as_secs(),
                )?),
                max_delay: Duration::from_secs(parse_var(
                    "LLM_MAX_BACKOFF_SECS",
                    retry_defaults.max_delay.as_secs(),
                )?),
            },
        };

        let api_port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => parse_value("PORT", &raw)?,
            Err(_) => 8080,
        };

        Ok(Self {
            llm,
            rewrite_query: parse_flag("AGENT_REWRITE_QUERY", false)?,
            api_port,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(name, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| invalid(name, raw))
}

fn parse_flag(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => flag_value(name, &raw),
        _ => Ok(default),
    }
}

fn flag_value(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, raw)),
    }
}

fn invalid(name: &str, raw: &str) -> OrchestrationError {
    OrchestrationError::ConfigError(format!("{} has an invalid value: {:?}", name, raw))
}
