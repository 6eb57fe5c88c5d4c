//! Model client with local-first / remote-fallback backends
//!
//! Every pipeline stage talks to a [`ChatModel`]. [`LlmClient`] is the
//! production implementation: it probes the local backend once per instance,
//! caches the decision, and retries rate-limited calls with bounded
//! exponential backoff.

use crate::config::{LlmConfig, RetryPolicy};
use crate::error::OrchestrationError;
use crate::models::{BackendMode, ChatMessage};
use crate::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub mod gemini;
pub mod local;

pub use gemini::GeminiBackend;
pub use local::OpenAiCompatibleBackend;

/// Chat-completion seam used by the planner, validator, summarizer and
/// orchestrator
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;

    /// Backend this model is bound to, if already decided
    fn backend_mode(&self) -> Option<BackendMode> {
        None
    }

    /// Decide the backend now if that has not happened yet
    async fn resolve_backend(&self) -> Option<BackendMode> {
        self.backend_mode()
    }
}

/// A single model-serving endpoint
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap liveness check
    async fn is_available(&self) -> bool;

    /// One completion call. Rate limiting must surface as
    /// [`OrchestrationError::RateLimited`] so the client can back off.
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}

/// Reusable model client (one backend decision per instance)
pub struct LlmClient {
    local: Option<Arc<dyn ChatBackend>>,
    remote: Option<Arc<dyn ChatBackend>>,
    retry: RetryPolicy,
    mode: OnceCell<Option<BackendMode>>,
    rate_limit_retries: AtomicU64,
}

impl LlmClient {
    pub fn new(
        local: Option<Arc<dyn ChatBackend>>,
        remote: Option<Arc<dyn ChatBackend>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            local,
            remote,
            retry,
            mode: OnceCell::new(),
            rate_limit_retries: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let local: Option<Arc<dyn ChatBackend>> = if config.prefer_local {
            Some(Arc::new(OpenAiCompatibleBackend::new(
                &config.local_url,
                &config.local_model,
                config.request_timeout,
            )?))
        } else {
            None
        };

        let remote: Option<Arc<dyn ChatBackend>> = match &config.gemini_api_key {
            Some(api_key) => Some(Arc::new(GeminiBackend::new(
                api_key,
                &config.gemini_base_url,
                &config.gemini_model,
                config.request_timeout,
            )?)),
            None => None,
        };

        Ok(Self::new(local, remote, config.retry.clone()))
    }

    /// Number of rate-limit retries performed by this instance
    pub fn rate_limit_retries(&self) -> u64 {
        self.rate_limit_retries.load(Ordering::Relaxed)
    }

    /// Decide the backend once. A failed local probe is never retried for
    /// this instance.
    pub async fn resolve_mode(&self) -> Option<BackendMode> {
        *self
            .mode
            .get_or_init(|| async {
                if let Some(local) = &self.local {
                    if local.is_available().await {
                        info!(backend = local.name(), "Local model backend is available");
                        return Some(BackendMode::Local);
                    }
                    warn!(backend = local.name(), "Local model backend did not answer the probe");
                }

                match &self.remote {
                    Some(remote) => {
                        info!(backend = remote.name(), "Using remote model backend");
                        Some(BackendMode::Remote)
                    }
                    None => None,
                }
            })
            .await
    }

    fn backend_for(&self, mode: BackendMode) -> Option<&Arc<dyn ChatBackend>> {
        match mode {
            BackendMode::Local => self.local.as_ref(),
            BackendMode::Remote => self.remote.as_ref(),
        }
    }

    async fn complete_with_retry(
        &self,
        backend: &dyn ChatBackend,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String> {
        let mut attempt: u32 = 0;

        loop {
            match backend.complete(messages, temperature).await {
                Err(OrchestrationError::RateLimited(detail)) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        warn!(
                            backend = backend.name(),
                            attempts = attempt,
                            "Giving up after repeated rate limiting"
                        );
                        return Err(OrchestrationError::RateLimitExceeded { attempts: attempt });
                    }

                    let delay = self.retry.delay_for(attempt - 1);
                    self.rate_limit_retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        backend = backend.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        detail = %detail,
                        "Rate limit hit, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let mode = self.resolve_mode().await.ok_or_else(|| {
            OrchestrationError::BackendUnavailable(
                "local backend is offline and GEMINI_API_KEY is not configured".to_string(),
            )
        })?;

        let backend = self.backend_for(mode).ok_or_else(|| {
            OrchestrationError::BackendUnavailable(format!("no {} backend configured", mode))
        })?;

        debug!(
            backend = backend.name(),
            messages = messages.len(),
            temperature,
            "Sending chat completion"
        );

        self.complete_with_retry(backend.as_ref(), messages, temperature)
            .await
    }

    fn backend_mode(&self) -> Option<BackendMode> {
        self.mode.get().copied().flatten()
    }

    async fn resolve_backend(&self) -> Option<BackendMode> {
        self.resolve_mode().await
    }
}

/// Classify a non-success HTTP response from a model backend
pub(crate) fn backend_error(backend: &str, status: StatusCode, body: &str) -> OrchestrationError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || body.to_uppercase().contains("RESOURCE_EXHAUSTED")
    {
        OrchestrationError::RateLimited(format!("{} returned {}", backend, status))
    } else {
        OrchestrationError::LlmError(format!("{} returned {}: {}", backend, status, body))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted stand-ins for model backends

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every request
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
        mode: Option<BackendMode>,
    }

    impl ScriptedModel {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
                requests: Mutex::new(Vec::new()),
                mode: Some(BackendMode::Local),
            }
        }

        pub fn failing(error: OrchestrationError) -> Self {
            let model = Self::new(Vec::<String>::new());
            model.replies.lock().unwrap().push_back(Err(error));
            model
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, index: usize) -> (Vec<ChatMessage>, f32) {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
            self.requests
                .lock()
                .unwrap()
                .push((messages.to_vec(), temperature));

            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OrchestrationError::LlmError("script exhausted".into())))
        }

        fn backend_mode(&self) -> Option<BackendMode> {
            self.mode
        }
    }

    /// Backend double with probe / call counters
    pub struct StubBackend {
        pub available: bool,
        pub probes: AtomicUsize,
        pub calls: AtomicUsize,
        /// Number of leading calls answered with a rate-limit error
        pub rate_limited_calls: usize,
        pub reply: String,
    }

    impl StubBackend {
        pub fn new(available: bool, reply: &str) -> Self {
            Self {
                available,
                probes: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                rate_limited_calls: 0,
                reply: reply.to_string(),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn is_available(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.available
        }

        async fn complete(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.rate_limited_calls {
                return Err(OrchestrationError::RateLimited("429".to_string()));
            }
            Ok(self.reply.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubBackend;
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn user(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn test_local_probe_failure_is_sticky() {
        let local = Arc::new(StubBackend::new(false, "local"));
        let remote = Arc::new(StubBackend::new(true, "remote"));
        let client = LlmClient::new(
            Some(local.clone() as Arc<dyn ChatBackend>),
            Some(remote.clone() as Arc<dyn ChatBackend>),
            fast_retry(3),
        );

        for _ in 0..3 {
            let reply = assert_ok!(client.chat(&user("hi"), 0.7).await);
            assert_eq!(reply, "remote");
        }

        assert_eq!(local.probes.load(Ordering::SeqCst), 1);
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.backend_mode(), Some(BackendMode::Remote));
    }

    #[tokio::test]
    async fn test_local_backend_preferred_when_alive() {
        let local = Arc::new(StubBackend::new(true, "local"));
        let remote = Arc::new(StubBackend::new(true, "remote"));
        let client = LlmClient::new(
            Some(local.clone() as Arc<dyn ChatBackend>),
            Some(remote.clone() as Arc<dyn ChatBackend>),
            fast_retry(3),
        );

        assert_eq!(client.backend_mode(), None);
        assert_eq!(client.chat(&user("hi"), 0.0).await.unwrap(), "local");
        assert_eq!(client.chat(&user("again"), 0.0).await.unwrap(), "local");
        assert_eq!(local.probes.load(Ordering::SeqCst), 1);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.backend_mode(), Some(BackendMode::Local));
    }

    #[tokio::test]
    async fn test_unavailable_when_no_backend_serves() {
        let local = Arc::new(StubBackend::new(false, "local"));
        let client = LlmClient::new(
            Some(local.clone() as Arc<dyn ChatBackend>),
            None,
            fast_retry(3),
        );

        let err = assert_err!(client.chat(&user("hi"), 0.7).await);
        assert!(matches!(err, OrchestrationError::BackendUnavailable(_)));

        let err = assert_err!(client.chat(&user("hi"), 0.7).await);
        assert!(err.is_backend_failure());
        assert_eq!(local.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_recovers_within_bound() {
        let mut remote = StubBackend::new(true, "finally");
        remote.rate_limited_calls = 2;
        let remote = Arc::new(remote);
        let client = LlmClient::new(None, Some(remote.clone() as Arc<dyn ChatBackend>), fast_retry(3));

        assert_eq!(client.chat(&user("hi"), 0.7).await.unwrap(), "finally");
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.rate_limit_retries(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_is_terminal() {
        let mut remote = StubBackend::new(true, "never");
        remote.rate_limited_calls = usize::MAX;
        let remote = Arc::new(remote);
        let client = LlmClient::new(None, Some(remote.clone() as Arc<dyn ChatBackend>), fast_retry(3));

        let err = assert_err!(client.chat(&user("hi"), 0.7).await);
        assert!(matches!(err, OrchestrationError::RateLimitExceeded { attempts: 3 }));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backend_error_classification() {
        let err = backend_error("gemini", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, OrchestrationError::RateLimited(_)));

        let err = backend_error(
            "gemini",
            StatusCode::FORBIDDEN,
            r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert!(matches!(err, OrchestrationError::RateLimited(_)));

        let err = backend_error("local", StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert!(matches!(err, OrchestrationError::LlmError(_)));
    }

    #[test]
    fn test_quota_wording_alone_is_not_rate_limiting() {
        let err = backend_error(
            "gemini",
            StatusCode::FORBIDDEN,
            r#"{"error":{"status":"PERMISSION_DENIED","message":"no quota project set"}}"#,
        );
        assert!(matches!(err, OrchestrationError::LlmError(_)));
    }

    #[tokio::test]
    async fn test_remote_only_config_skips_local_probe() {
        let config = LlmConfig {
            prefer_local: false,
            gemini_api_key: Some("test-key".to_string()),
            ..LlmConfig::default()
        };
        let client = assert_ok!(LlmClient::from_config(&config));
        assert_eq!(client.resolve_mode().await, Some(BackendMode::Remote));

        let config = LlmConfig {
            prefer_local: false,
            gemini_api_key: None,
            ..LlmConfig::default()
        };
        let client = assert_ok!(LlmClient::from_config(&config));
        assert_eq!(client.resolve_mode().await, None);
    }
}
