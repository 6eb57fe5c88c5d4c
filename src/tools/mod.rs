//! Capability registry
//!
//! Providers hand the registry an explicit list of capabilities at startup.
//! Each capability keeps its calling convention (sync or async) behind a
//! uniform `invoke`. Names are unique across all providers.

use crate::error::OrchestrationError;
use crate::models::ToolArgs;
use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

pub mod builtin;
pub use builtin::UtilityTools;

type SyncFn = dyn Fn(ToolArgs) -> Result<Value> + Send + Sync;
type AsyncFn = dyn Fn(ToolArgs) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Calling convention of a capability
#[derive(Clone)]
pub enum ToolHandler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl ToolHandler {
    pub fn is_async(&self) -> bool {
        matches!(self, ToolHandler::Async(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    /// Any JSON value; receives structured carry values untouched
    Json,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Json => "json",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl Param {
    pub fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// A named, invocable operation exposed by a provider
#[derive(Clone)]
pub struct Capability {
    name: String,
    documentation: String,
    params: Vec<Param>,
    handler: ToolHandler,
}

impl Capability {
    pub fn sync<F>(name: &str, documentation: &str, params: Vec<Param>, handler: F) -> Self
    where
        F: Fn(ToolArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            documentation: documentation.to_string(),
            params,
            handler: ToolHandler::Sync(Arc::new(handler)),
        }
    }

    pub fn asynchronous<F, Fut>(
        name: &str,
        documentation: &str,
        params: Vec<Param>,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            documentation: documentation.to_string(),
            params,
            handler: ToolHandler::Async(Arc::new(move |args| handler(args).boxed())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_async(&self) -> bool {
        self.handler.is_async()
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// `a: string, b?: number`
    pub fn signature(&self) -> String {
        self.params
            .iter()
            .map(|p| {
                format!(
                    "{}{}: {}",
                    p.name,
                    if p.required { "" } else { "?" },
                    p.kind
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Check a flat argument mapping against the declared parameters
    pub fn bind(&self, args: &ToolArgs) -> Result<()> {
        if let Some(unexpected) = args.keys().find(|key| self.param(key).is_none()) {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "unexpected argument '{}'",
                unexpected
            )));
        }

        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && args.get(p.name).map_or(true, Value::is_null))
        {
            return Err(OrchestrationError::InvalidToolInput(format!(
                "missing required argument '{}'",
                missing.name
            )));
        }

        Ok(())
    }

    /// Bind and run, awaiting if the capability is asynchronous
    pub async fn invoke(&self, args: ToolArgs) -> Result<Value> {
        self.bind(&args)?;

        match &self.handler {
            ToolHandler::Sync(handler) => handler(args),
            ToolHandler::Async(handler) => handler(args).await,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("signature", &self.signature())
            .field("async", &self.is_async())
            .finish()
    }
}

/// Anything exposing tool-callable operations
pub trait ToolProvider: Send + Sync {
    fn category(&self) -> &'static str;

    fn capabilities(self: Arc<Self>) -> Vec<Capability>;
}

/// Tool registry for looking up and executing capabilities
#[derive(Default)]
pub struct ToolRegistry {
    capabilities: Vec<Capability>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every capability of `provider`. A name clash (with an earlier
    /// provider or within this one) rejects the whole provider.
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) -> Result<()> {
        let category = provider.category();
        let capabilities = provider.capabilities();

        let mut seen = HashSet::new();
        for capability in &capabilities {
            if self.index.contains_key(capability.name()) || !seen.insert(capability.name()) {
                return Err(OrchestrationError::DuplicateCapability {
                    name: capability.name().to_string(),
                });
            }
        }

        for capability in capabilities {
            info!(
                category,
                tool = capability.name(),
                is_async = capability.is_async(),
                "Registered capability"
            );
            self.index
                .insert(capability.name().to_string(), self.capabilities.len());
            self.capabilities.push(capability);
        }

        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    pub fn list(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// `name(signature): documentation`, one line per capability
    pub fn describe_all(&self) -> String {
        self.capabilities
            .iter()
            .map(|c| format!("{}({}): {}", c.name(), c.signature(), c.documentation()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read a string argument, failing with `InvalidToolInput` if absent
pub fn require_str<'a>(args: &'a ToolArgs, name: &str) -> Result<&'a str> {
    args.get(name).and_then(Value::as_str).ok_or_else(|| {
        OrchestrationError::InvalidToolInput(format!("Expected string argument '{}'", name))
    })
}

/// Create a registry with the built-in utility capabilities
pub fn create_default_registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(UtilityTools::new()?))?;
    Ok(registry)
}
