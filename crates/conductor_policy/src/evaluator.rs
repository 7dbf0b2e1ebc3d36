//! Ordered policy rules and the default evaluator.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use conductor_approvals::{ApprovalTokenValidator, NullApprovalTokenValidator};
use conductor_protocol::{AutonomyLevel, CapabilityId, SkillContext};
use conductor_registry::ActionEntry;

use crate::rate_limit::RateLimiter;

pub const META_ACTOR: &str = "policy.context.actor";
pub const META_CHANNEL: &str = "policy.context.channel";
pub const META_PROPOSAL_ID: &str = "policy.context.proposal_id";
pub const META_TOKEN_VALID: &str = "policy.approval.token_valid";
pub const META_TOKEN_STATUS: &str = "policy.approval.token_status";
pub const META_TOKEN_REASON: &str = "policy.approval.token_reason";

/// Inputs to policy evaluation, derived from the request context plus the
/// deterministic proposal id for this request shape.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub actor: Option<String>,
    pub channel: Option<String>,
    pub allowed_capabilities: BTreeSet<CapabilityId>,
    pub max_autonomy: Option<AutonomyLevel>,
    pub confirmed: bool,
    pub proposal_id: String,
    pub approval_token: Option<String>,
}

impl PolicyContext {
    pub fn from_context(context: &SkillContext, proposal_id: impl Into<String>) -> Self {
        Self {
            actor: context.actor.clone(),
            channel: context.channel.clone(),
            allowed_capabilities: context.allowed_capabilities.clone(),
            max_autonomy: context.max_autonomy,
            confirmed: context.confirmed,
            proposal_id: proposal_id.into(),
            approval_token: context.approval_token.clone(),
        }
    }
}

/// Outcome of policy evaluation: reasons plus flat metadata for audit.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reasons: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl PolicyDecision {
    fn log(&self, entry: &dyn ActionEntry) {
        info!(
            action = entry.name(),
            version = entry.version(),
            allowed = self.allowed,
            reasons = ?self.reasons,
            "policy decision"
        );
    }
}

#[derive(Debug, Error)]
#[error("policy evaluation failed: {0}")]
pub struct PolicyEvalError(pub String);

/// Evaluation seam; hosts may substitute their own policy stack.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(
        &self,
        entry: &dyn ActionEntry,
        context: &PolicyContext,
    ) -> Result<PolicyDecision, PolicyEvalError>;
}

/// Flat metadata snapshot for a policy context, reused by audit records
/// when evaluation itself fails.
pub fn build_policy_metadata(
    context: &PolicyContext,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(META_ACTOR.to_string(), context.actor.clone().unwrap_or_default());
    metadata.insert(
        META_CHANNEL.to_string(),
        context.channel.clone().unwrap_or_default(),
    );
    metadata.insert(META_PROPOSAL_ID.to_string(), context.proposal_id.clone());
    metadata
}

/// Default policy stack.
///
/// Rule order: channel lists, actor lists, capability scoping, autonomy
/// ceiling, review gate, rate limit, approval token consumption.
pub struct DefaultPolicy {
    rate_limiter: RateLimiter,
    token_validator: Arc<dyn ApprovalTokenValidator>,
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultPolicy {
    pub fn new() -> Self {
        Self {
            rate_limiter: RateLimiter::new(),
            token_validator: Arc::new(NullApprovalTokenValidator),
        }
    }

    pub fn with_token_validator(mut self, validator: Arc<dyn ApprovalTokenValidator>) -> Self {
        self.token_validator = validator;
        self
    }
}

impl PolicyEvaluator for DefaultPolicy {
    fn evaluate(
        &self,
        entry: &dyn ActionEntry,
        context: &PolicyContext,
    ) -> Result<PolicyDecision, PolicyEvalError> {
        let mut reasons: Vec<String> = Vec::new();
        let mut metadata = build_policy_metadata(context);

        if let Some(channels) = entry.channels() {
            let channel = context.channel.as_deref();
            if channel.is_some_and(|c| channels.deny.contains(c)) {
                reasons.push("channel_denied".to_string());
            }
            if !channels.allow.is_empty() && !channel.is_some_and(|c| channels.allow.contains(c)) {
                reasons.push("channel_not_allowed".to_string());
            }
        }

        if let Some(actors) = entry.actors() {
            let actor = context.actor.as_deref();
            if actor.is_some_and(|a| actors.deny.contains(a)) {
                reasons.push("actor_denied".to_string());
            }
            if !actors.allow.is_empty() && !actor.is_some_and(|a| actors.allow.contains(a)) {
                reasons.push("actor_not_allowed".to_string());
            }
        }

        for capability in entry.capabilities() {
            if !context.allowed_capabilities.contains(capability) {
                reasons.push(format!("capability_not_allowed:{capability}"));
            }
        }

        if let Some(max_autonomy) = context.max_autonomy {
            if entry.autonomy() > max_autonomy {
                reasons.push("autonomy_exceeds_limit".to_string());
            }
        }

        // L1 entries and `requires_review`-tagged entries both sit behind
        // the review gate until confirmed or unlocked by a token.
        if entry.requires_approval() && !context.confirmed {
            reasons.push("review_required".to_string());
        }

        if let Some(rate_limit) = entry.rate_limit() {
            let key = format!("{}@{}", entry.name(), entry.version());
            if !self.rate_limiter.allow(&key, rate_limit.max_per_minute) {
                reasons.push("rate_limit_exceeded".to_string());
            }
        }

        if entry.requires_approval() {
            if let Some(token) = context.approval_token.as_deref() {
                let actor = context.actor.as_deref().unwrap_or("");
                let validation = self.token_validator.validate(token, actor, &context.proposal_id);
                metadata.insert(META_TOKEN_VALID.to_string(), validation.valid.to_string());
                if validation.valid {
                    metadata.insert(META_TOKEN_STATUS.to_string(), "valid".to_string());
                    metadata.insert(META_TOKEN_REASON.to_string(), String::new());
                    reasons.retain(|reason| reason != "review_required");
                } else {
                    let status = validation
                        .reason
                        .map(|reason| reason.public_label())
                        .unwrap_or("invalid");
                    metadata.insert(META_TOKEN_STATUS.to_string(), status.to_string());
                    metadata.insert(
                        META_TOKEN_REASON.to_string(),
                        validation.reason.map(|r| r.as_str().to_string()).unwrap_or_default(),
                    );
                    reasons.push(format!("approval_token_{status}"));
                }
            }
        }

        let decision = PolicyDecision {
            allowed: reasons.is_empty(),
            reasons,
            metadata,
        };
        decision.log(entry);
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_approvals::InMemoryApprovalTokenStore;
    use conductor_protocol::SkillDefinition;
    use conductor_registry::{ActorPolicy, ChannelPolicy, SkillRuntimeEntry};
    use serde_json::json;

    fn entry(autonomy: &str, tags: &[&str], rate: Option<u32>) -> SkillRuntimeEntry {
        let definition: SkillDefinition = serde_json::from_value(json!({
            "kind": "logic",
            "name": "send_email",
            "version": "1.0.0",
            "description": "Send an email",
            "inputs_schema": {"type": "object"},
            "outputs_schema": {"type": "object"},
            "capabilities": ["email.send"],
            "autonomy": autonomy,
            "policy_tags": tags,
            "entrypoint": {"runtime": "native", "module": "email", "handler": "send"},
            "call_targets": [{"kind": "op", "name": "smtp_send"}],
            "failure_modes": [{"code": "smtp_unavailable", "description": "down"}]
        }))
        .unwrap();
        SkillRuntimeEntry {
            status: definition.status(),
            autonomy: definition.autonomy(),
            rate_limit: rate.map(|max_per_minute| conductor_protocol::RateLimit { max_per_minute }),
            channels: None,
            actors: None,
            definition,
        }
    }

    fn policy_context(capabilities: &[&str]) -> PolicyContext {
        PolicyContext {
            actor: Some("alice".to_string()),
            channel: Some("cli".to_string()),
            allowed_capabilities: capabilities
                .iter()
                .map(|id| CapabilityId::from_raw(*id))
                .collect(),
            max_autonomy: None,
            confirmed: false,
            proposal_id: "proposal-1".to_string(),
            approval_token: None,
        }
    }

    #[test]
    fn test_allowed_when_nothing_objects() {
        let policy = DefaultPolicy::new();
        let decision = policy
            .evaluate(&entry("L2", &[], None), &policy_context(&["email.send"]))
            .unwrap();
        assert!(decision.allowed);
        assert!(decision.reasons.is_empty());
        assert_eq!(decision.metadata[META_PROPOSAL_ID], "proposal-1");
    }

    #[test]
    fn test_capability_not_allowed() {
        let policy = DefaultPolicy::new();
        let decision = policy
            .evaluate(&entry("L2", &[], None), &policy_context(&[]))
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reasons, vec!["capability_not_allowed:email.send"]);
    }

    #[test]
    fn test_channel_deny_and_allow_lists() {
        let policy = DefaultPolicy::new();
        let mut gated = entry("L2", &[], None);
        gated.channels = Some(ChannelPolicy {
            allow: ["slack".to_string()].into_iter().collect(),
            deny: ["cli".to_string()].into_iter().collect(),
        });
        let decision = policy.evaluate(&gated, &policy_context(&["email.send"])).unwrap();
        assert_eq!(decision.reasons, vec!["channel_denied", "channel_not_allowed"]);
    }

    #[test]
    fn test_actor_lists() {
        let policy = DefaultPolicy::new();
        let mut gated = entry("L2", &[], None);
        gated.actors = Some(ActorPolicy {
            allow: ["bob".to_string()].into_iter().collect(),
            deny: Default::default(),
        });
        let decision = policy.evaluate(&gated, &policy_context(&["email.send"])).unwrap();
        assert_eq!(decision.reasons, vec!["actor_not_allowed"]);
    }

    #[test]
    fn test_autonomy_ceiling() {
        let policy = DefaultPolicy::new();
        let mut context = policy_context(&["email.send"]);
        context.max_autonomy = Some(AutonomyLevel::L1);
        let decision = policy.evaluate(&entry("L2", &[], None), &context).unwrap();
        assert_eq!(decision.reasons, vec!["autonomy_exceeds_limit"]);
    }

    #[test]
    fn test_review_required_for_tag_and_l1() {
        let policy = DefaultPolicy::new();
        let tagged = entry("L2", &["requires_review"], None);
        let decision = policy.evaluate(&tagged, &policy_context(&["email.send"])).unwrap();
        assert_eq!(decision.reasons, vec!["review_required"]);

        let l1 = entry("L1", &[], None);
        let decision = policy.evaluate(&l1, &policy_context(&["email.send"])).unwrap();
        assert_eq!(decision.reasons, vec!["review_required"]);
    }

    #[test]
    fn test_confirmed_clears_review() {
        let policy = DefaultPolicy::new();
        let mut context = policy_context(&["email.send"]);
        context.confirmed = true;
        let decision = policy.evaluate(&entry("L1", &[], None), &context).unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn test_rate_limit_exceeded() {
        let policy = DefaultPolicy::new();
        let limited = entry("L2", &[], Some(2));
        let context = policy_context(&["email.send"]);
        assert!(policy.evaluate(&limited, &context).unwrap().allowed);
        assert!(policy.evaluate(&limited, &context).unwrap().allowed);
        let decision = policy.evaluate(&limited, &context).unwrap();
        assert_eq!(decision.reasons, vec!["rate_limit_exceeded"]);
    }

    #[test]
    fn test_valid_token_satisfies_review() {
        let store = Arc::new(InMemoryApprovalTokenStore::new());
        let token = store.issue("alice", "proposal-1");
        let policy = DefaultPolicy::new().with_token_validator(store);

        let mut context = policy_context(&["email.send"]);
        context.approval_token = Some(token);
        let decision = policy.evaluate(&entry("L1", &[], None), &context).unwrap();
        assert!(decision.allowed, "reasons: {:?}", decision.reasons);
        assert_eq!(decision.metadata[META_TOKEN_VALID], "true");
        assert_eq!(decision.metadata[META_TOKEN_STATUS], "valid");
    }

    #[test]
    fn test_expired_token_adds_reason() {
        let store = Arc::new(InMemoryApprovalTokenStore::new());
        let token = store.issue_with_ttl("alice", "proposal-1", -1);
        let policy = DefaultPolicy::new().with_token_validator(store);

        let mut context = policy_context(&["email.send"]);
        context.approval_token = Some(token);
        let decision = policy.evaluate(&entry("L1", &[], None), &context).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reasons.contains(&"review_required".to_string()));
        assert!(decision.reasons.contains(&"approval_token_expired".to_string()));
        assert_eq!(decision.metadata[META_TOKEN_STATUS], "expired");
        assert_eq!(decision.metadata[META_TOKEN_REASON], "expired");
    }

    #[test]
    fn test_mismatched_token_is_invalid() {
        let store = Arc::new(InMemoryApprovalTokenStore::new());
        let token = store.issue("alice", "some-other-proposal");
        let policy = DefaultPolicy::new().with_token_validator(store);

        let mut context = policy_context(&["email.send"]);
        context.approval_token = Some(token);
        let decision = policy.evaluate(&entry("L1", &[], None), &context).unwrap();
        assert!(decision.reasons.contains(&"approval_token_invalid".to_string()));
        assert_eq!(decision.metadata[META_TOKEN_REASON], "proposal_mismatch");
    }

    #[test]
    fn test_token_ignored_without_approval_gate() {
        let store = Arc::new(InMemoryApprovalTokenStore::new());
        let token = store.issue("alice", "proposal-1");
        let policy = DefaultPolicy::new().with_token_validator(store);

        let mut context = policy_context(&["email.send"]);
        context.approval_token = Some(token);
        let decision = policy.evaluate(&entry("L2", &[], None), &context).unwrap();
        assert!(decision.allowed);
        assert!(!decision.metadata.contains_key(META_TOKEN_VALID));
    }
}
