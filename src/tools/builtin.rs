//! Built-in utility capabilities
//!
//! Small, dependency-free tools so the binaries work without external
//! providers. Domain tools (market data, search, file access) plug in as
//! further `ToolProvider`s.

use super::{require_str, Capability, Param, ParamKind, ToolProvider};
use crate::error::OrchestrationError;
use crate::models::ToolArgs;
use crate::Result;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on text returned by `fetch_url`
const MAX_FETCH_CHARS: usize = 4000;

pub struct UtilityTools {
    client: Client,
}

impl UtilityTools {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client })
    }

    fn echo(args: ToolArgs) -> Result<Value> {
        Ok(json!(require_str(&args, "msg")?))
    }

    fn current_time(_args: ToolArgs) -> Result<Value> {
        Ok(json!(Utc::now().to_rfc3339()))
    }

    fn word_count(args: ToolArgs) -> Result<Value> {
        let text = require_str(&args, "text")?;
        Ok(json!(text.split_whitespace().count()))
    }

    async fn fetch_url(&self, args: ToolArgs) -> Result<Value> {
        let url = require_str(&args, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "Only http(s) URLs can be fetched, got '{}'",
                url
            )));
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            OrchestrationError::ToolError(format!("Request to {} failed: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestrationError::ToolError(format!(
                "{} returned {}",
                url, status
            )));
        }

        let body = response.text().await?;
        Ok(json!(truncate_chars(&body, MAX_FETCH_CHARS)))
    }
}

impl ToolProvider for UtilityTools {
    fn category(&self) -> &'static str {
        "utility"
    }

    fn capabilities(self: Arc<Self>) -> Vec<Capability> {
        vec![
            Capability::sync(
                "echo",
                "Return msg unchanged. Useful to pass text between steps.",
                vec![Param::required("msg", ParamKind::String)],
                Self::echo,
            ),
            Capability::sync(
                "current_time",
                "Current UTC date and time in RFC 3339 format.",
                vec![],
                Self::current_time,
            ),
            Capability::sync(
                "word_count",
                "Count the words in text.",
                vec![Param::required("text", ParamKind::String)],
                Self::word_count,
            ),
            Capability::asynchronous(
                "fetch_url",
                "Download a web page and return its raw text (truncated).",
                vec![Param::required("url", ParamKind::String)],
                move |args| {
                    let tools = Arc::clone(&self);
                    async move { tools.fetch_url(args).await }
                },
            ),
        ]
    }
}

/// Cut `text` to at most `max` characters without splitting a code point
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    fn args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(UtilityTools::new().unwrap())).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_echo_and_word_count() {
        let registry = registry();

        let echo = registry.resolve("echo").unwrap();
        assert_eq!(
            echo.invoke(args(json!({"msg": "hello"}))).await.unwrap(),
            json!("hello")
        );

        let count = registry.resolve("word_count").unwrap();
        assert_eq!(
            count
                .invoke(args(json!({"text": "one two  three"})))
                .await
                .unwrap(),
            json!(3)
        );
    }

    #[tokio::test]
    async fn test_fetch_url_rejects_other_schemes() {
        let registry = registry();
        let fetch = registry.resolve("fetch_url").unwrap();
        assert!(fetch.is_async());

        let err = fetch
            .invoke(args(json!({"url": "file:///etc/passwd"})))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidToolInput(_)));
    }

    #[test]
    fn test_descriptions_include_every_tool() {
        let described = registry().describe_all();
        assert!(described.contains("echo(msg: string): Return msg unchanged."));
        assert!(described.contains("current_time(): "));
        assert!(described.contains("fetch_url(url: string)"));
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
