//! Attention preview hook, awaited before policy evaluation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use conductor_approvals::RoutingError;
use conductor_protocol::SkillContext;
use conductor_registry::ActionEntry;

/// Best-effort preview of an inbound request for the attention surface.
///
/// The hook completes before policy evaluation and dispatch; failures are
/// logged and do not fail the request. There is no implicit default: hosts
/// wire a hook explicitly when composing a runtime.
#[async_trait]
pub trait RoutingHook: Send + Sync {
    async fn preview(
        &self,
        entry: &dyn ActionEntry,
        context: &SkillContext,
        inputs: &Map<String, Value>,
    ) -> Result<(), RoutingError>;
}

/// Hook that records previews to the log stream only.
#[derive(Debug, Default)]
pub struct LoggingRoutingHook;

#[async_trait]
impl RoutingHook for LoggingRoutingHook {
    async fn preview(
        &self,
        entry: &dyn ActionEntry,
        context: &SkillContext,
        _inputs: &Map<String, Value>,
    ) -> Result<(), RoutingError> {
        info!(
            action = entry.name(),
            version = entry.version(),
            actor = context.actor.as_deref().unwrap_or(""),
            channel = context.channel.as_deref().unwrap_or(""),
            "attention preview"
        );
        Ok(())
    }
}
