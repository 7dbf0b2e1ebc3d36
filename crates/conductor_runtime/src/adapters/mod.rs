//! Transport adapters, keyed by runtime selector.
//!
//! One adapter interface serves both skills and ops; the runtimes resolve
//! the entry's selector (`native`, `http`, `script`, `mcp`) against a map
//! of registered adapters built at composition time. Each call is bounded
//! by the adapter's per-call timeout.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use conductor_protocol::{Entrypoint, OpDefinition, SkillContext};
use conductor_registry::ActionEntry;

use crate::composition::Invoker;

pub mod http;
pub mod mcp;
pub mod native;
pub mod script;

pub use http::HttpAdapter;
pub use mcp::{McpAdapter, ToolTransport, ToolTransportError};
pub use native::{FnHandler, NativeAdapter, NativeHandler, NativeHandlerTable};
pub use script::ScriptAdapter;

/// Adapter failure with a stable code (`timeout`, `handler_missing`,
/// `tool_call_failed`, ...).
#[derive(Debug, Error, Clone)]
#[error("{code}: {message}")]
pub struct AdapterError {
    pub code: String,
    pub message: String,
}

impl AdapterError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn timeout(runtime: &str) -> Self {
        Self::new("timeout", format!("{runtime} adapter call timed out"))
    }
}

/// Resolved entrypoint fields for a call, independent of entry kind.
#[derive(Debug, Clone, Copy)]
pub struct EntrypointSpec<'a> {
    pub runtime: &'a str,
    pub module: Option<&'a str>,
    pub handler: Option<&'a str>,
    pub url: Option<&'a str>,
    pub command: Option<&'a str>,
    pub tool: Option<&'a str>,
}

impl<'a> EntrypointSpec<'a> {
    pub fn from_skill(entrypoint: &'a Entrypoint) -> Self {
        Self {
            runtime: entrypoint.runtime.as_str(),
            module: entrypoint.module.as_deref(),
            handler: entrypoint.handler.as_deref(),
            url: entrypoint.url.as_deref(),
            command: entrypoint.command.as_deref(),
            tool: entrypoint.tool.as_deref(),
        }
    }

    pub fn from_op(op: &'a OpDefinition) -> Self {
        Self {
            runtime: op.runtime.as_str(),
            module: op.module.as_deref(),
            handler: op.handler.as_deref(),
            url: op.url.as_deref(),
            command: op.command.as_deref(),
            tool: op.tool.as_deref(),
        }
    }
}

/// One adapter invocation.
pub struct AdapterCall<'a> {
    pub entry: &'a dyn ActionEntry,
    pub entrypoint: EntrypointSpec<'a>,
    pub inputs: &'a Map<String, Value>,
    pub context: &'a SkillContext,
    /// Present only for logic skills; nested invocation handle.
    pub invoker: Option<&'a Invoker<'a>>,
}

/// Transport-specific execution seam shared by skills and ops.
#[async_trait]
pub trait ActionAdapter: Send + Sync {
    async fn execute(&self, call: AdapterCall<'_>) -> Result<Map<String, Value>, AdapterError>;
}

/// Adapter registry keyed by runtime selector string.
pub type AdapterMap = HashMap<String, Arc<dyn ActionAdapter>>;
