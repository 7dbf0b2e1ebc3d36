//! Capability-scoped execution context for skill and op invocations.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::types::{AutonomyLevel, CapabilityId};

/// Immutable per-invocation context.
///
/// A context names the capabilities the caller may exercise, who is acting
/// and where, the autonomy ceiling, and the tracing identity of the
/// invocation. Child contexts narrow capabilities and re-parent the
/// invocation id; everything else is inherited.
#[derive(Debug, Clone)]
pub struct SkillContext {
    pub allowed_capabilities: BTreeSet<CapabilityId>,
    pub actor: Option<String>,
    pub channel: Option<String>,
    pub max_autonomy: Option<AutonomyLevel>,
    pub confirmed: bool,
    pub approval_token: Option<String>,
    pub trace_id: String,
    pub invocation_id: String,
    pub parent_invocation_id: Option<String>,
}

impl SkillContext {
    /// Create a root context with a fresh trace and invocation id.
    pub fn new(allowed_capabilities: BTreeSet<CapabilityId>) -> Self {
        Self {
            allowed_capabilities,
            actor: None,
            channel: None,
            max_autonomy: None,
            confirmed: false,
            approval_token: None,
            trace_id: fresh_id(),
            invocation_id: fresh_id(),
            parent_invocation_id: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_max_autonomy(mut self, level: AutonomyLevel) -> Self {
        self.max_autonomy = Some(level);
        self
    }

    /// Mark the request as operator-confirmed out-of-band.
    pub fn with_confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }

    pub fn with_approval_token(mut self, token: impl Into<String>) -> Self {
        self.approval_token = Some(token.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Derive a child context for a nested invocation.
    ///
    /// Allowed capabilities become the intersection of this context's
    /// capabilities with the child's requested set. The child gets a fresh
    /// invocation id parented to this one.
    pub fn child(&self, requested_capabilities: &[CapabilityId]) -> Self {
        let requested: BTreeSet<CapabilityId> = requested_capabilities.iter().cloned().collect();
        let allowed = self
            .allowed_capabilities
            .intersection(&requested)
            .cloned()
            .collect();
        Self {
            allowed_capabilities: allowed,
            actor: self.actor.clone(),
            channel: self.channel.clone(),
            max_autonomy: self.max_autonomy,
            confirmed: self.confirmed,
            approval_token: self.approval_token.clone(),
            trace_id: self.trace_id.clone(),
            invocation_id: fresh_id(),
            parent_invocation_id: Some(self.invocation_id.clone()),
        }
    }
}

fn fresh_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(ids: &[&str]) -> BTreeSet<CapabilityId> {
        ids.iter().map(|id| CapabilityId::from_raw(*id)).collect()
    }

    #[test]
    fn test_child_narrows_capabilities() {
        let parent = SkillContext::new(caps(&["email.send", "fs.read"]))
            .with_actor("alice")
            .with_channel("cli");
        let requested = vec![
            CapabilityId::from_raw("email.send"),
            CapabilityId::from_raw("net.fetch"),
        ];
        let child = parent.child(&requested);
        assert_eq!(child.allowed_capabilities, caps(&["email.send"]));
        assert_eq!(child.actor.as_deref(), Some("alice"));
        assert_eq!(child.trace_id, parent.trace_id);
        assert_eq!(child.parent_invocation_id.as_deref(), Some(parent.invocation_id.as_str()));
        assert_ne!(child.invocation_id, parent.invocation_id);
    }

    #[test]
    fn test_child_inherits_confirmation_and_token() {
        let parent = SkillContext::new(caps(&["email.send"]))
            .with_confirmed(true)
            .with_approval_token("tok");
        let child = parent.child(&[CapabilityId::from_raw("email.send")]);
        assert!(child.confirmed);
        assert_eq!(child.approval_token.as_deref(), Some("tok"));
    }
}
