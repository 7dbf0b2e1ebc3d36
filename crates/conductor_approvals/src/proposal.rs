//! Proposal artifacts and deterministic proposal ids.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use conductor_protocol::canonical::canonical_json;
use conductor_protocol::defaults::{DEFAULT_APPROVAL_TTL_SECS, PROPOSAL_REDACTED_SENTINEL, PROPOSAL_VERSION};
use conductor_protocol::{CallTargetKind, CapabilityId, SkillContext};
use conductor_registry::ActionEntry;

/// Denial reasons that qualify a request for the approval path.
const APPROVAL_REASONS: [&str; 2] = ["approval_required", "review_required"];

/// Execution context captured on a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalContext {
    pub actor: String,
    pub channel: String,
    pub trace_id: String,
    pub invocation_id: String,
}

/// Redacted-field lists recorded on a proposal. Field names only; values
/// never leave the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRedactions {
    #[serde(default)]
    pub inputs: Vec<String>,
}

/// Approval proposal payload for attention routing and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalProposal {
    pub proposal_version: String,
    pub proposal_id: String,
    pub action_kind: CallTargetKind,
    pub action_name: String,
    pub action_version: String,
    pub autonomy: String,
    pub required_capabilities: Vec<CapabilityId>,
    pub policy_tags: Vec<String>,
    pub reason_for_review: String,
    pub context: ProposalContext,
    pub redactions: ProposalRedactions,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Terminal decision on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Approved,
    Rejected,
    Expired,
}

/// Record of an approval decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub proposal_id: String,
    pub actor: String,
    pub decision: DecisionKind,
    pub decided_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub token_used: bool,
}

/// Deterministic proposal id for an action instance.
///
/// SHA-256 over the canonical JSON of the action identity, the captured
/// context, and the inputs with redacted fields masked. The same request
/// shape always hashes to the same id, so a token issued against a
/// proposal unlocks exactly the request that produced it.
pub fn build_proposal_id(
    entry: &dyn ActionEntry,
    context: &SkillContext,
    inputs: &Map<String, Value>,
) -> String {
    let payload = json!({
        "action": {
            "kind": entry.kind().as_str(),
            "name": entry.name(),
            "version": entry.version(),
            "autonomy": entry.autonomy().as_str(),
        },
        "context": {
            "actor": context.actor.as_deref().unwrap_or(""),
            "channel": context.channel.as_deref().unwrap_or(""),
            "trace_id": context.trace_id,
            "invocation_id": context.invocation_id,
        },
        "inputs": Value::Object(redact_for_hash(entry, inputs)),
    });
    let digest = Sha256::digest(canonical_json(&payload).as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Build an approval proposal artifact for a blocked request.
pub fn build_proposal(
    entry: &dyn ActionEntry,
    context: &SkillContext,
    inputs: &Map<String, Value>,
    reason: &str,
) -> ApprovalProposal {
    build_proposal_with_ttl(entry, context, inputs, reason, DEFAULT_APPROVAL_TTL_SECS)
}

pub fn build_proposal_with_ttl(
    entry: &dyn ActionEntry,
    context: &SkillContext,
    inputs: &Map<String, Value>,
    reason: &str,
    ttl_seconds: i64,
) -> ApprovalProposal {
    let now = Utc::now();
    let redactions = ProposalRedactions {
        inputs: entry
            .redaction()
            .map(|redaction| redaction.inputs.clone())
            .unwrap_or_default(),
    };
    ApprovalProposal {
        proposal_version: PROPOSAL_VERSION.to_string(),
        proposal_id: build_proposal_id(entry, context, inputs),
        action_kind: entry.kind(),
        action_name: entry.name().to_string(),
        action_version: entry.version().to_string(),
        autonomy: entry.autonomy().as_str().to_string(),
        required_capabilities: entry.capabilities().to_vec(),
        policy_tags: entry.policy_tags().to_vec(),
        reason_for_review: reason.to_string(),
        context: ProposalContext {
            actor: context.actor.clone().unwrap_or_default(),
            channel: context.channel.clone().unwrap_or_default(),
            trace_id: context.trace_id.clone(),
            invocation_id: context.invocation_id.clone(),
        },
        redactions,
        created_at: now,
        expires_at: now + Duration::seconds(ttl_seconds),
    }
}

/// Pick the reason a proposal is routed under, if any.
pub fn approval_denial_reason(reasons: &[String]) -> Option<&str> {
    reasons
        .iter()
        .map(String::as_str)
        .find(|reason| APPROVAL_REASONS.contains(reason))
}

/// True when every denial reason is approval-related (the named approval
/// reasons plus token-status reasons). Mixed denials, e.g. a rate limit on
/// top of a review gate, do not qualify for the approval path.
pub fn is_approval_only_denial(reasons: &[String]) -> bool {
    reasons.iter().all(|reason| {
        APPROVAL_REASONS.contains(&reason.as_str()) || reason.starts_with("approval_token_")
    })
}

fn redact_for_hash(entry: &dyn ActionEntry, inputs: &Map<String, Value>) -> Map<String, Value> {
    let fields = match entry.redaction() {
        Some(redaction) if !redaction.inputs.is_empty() => &redaction.inputs,
        _ => return inputs.clone(),
    };
    let mut masked = inputs.clone();
    for field in fields {
        if let Some(value) = masked.get_mut(field) {
            *value = Value::String(PROPOSAL_REDACTED_SENTINEL.to_string());
        }
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_protocol::SkillDefinition;
    use conductor_registry::SkillRuntimeEntry;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn entry(redacted: &[&str]) -> SkillRuntimeEntry {
        let definition: SkillDefinition = serde_json::from_value(json!({
            "kind": "logic",
            "name": "send_email",
            "version": "1.0.0",
            "description": "Send an email",
            "inputs_schema": {"type": "object"},
            "outputs_schema": {"type": "object"},
            "capabilities": ["email.send"],
            "autonomy": "L1",
            "policy_tags": ["requires_review"],
            "entrypoint": {"runtime": "native", "module": "email", "handler": "send"},
            "call_targets": [{"kind": "op", "name": "smtp_send"}],
            "redaction": {"inputs": redacted, "outputs": []},
            "failure_modes": [{"code": "smtp_unavailable", "description": "down"}]
        }))
        .unwrap();
        SkillRuntimeEntry {
            status: definition.status(),
            autonomy: definition.autonomy(),
            rate_limit: None,
            channels: None,
            actors: None,
            definition,
        }
    }

    fn context() -> SkillContext {
        SkillContext::new(BTreeSet::new())
            .with_actor("alice")
            .with_channel("cli")
            .with_trace_id("trace-1")
    }

    fn inputs() -> Map<String, Value> {
        json!({"to": "bob@example.com", "body": "secret"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_proposal_id_deterministic() {
        let entry = entry(&[]);
        let context = context();
        let first = build_proposal_id(&entry, &context, &inputs());
        let second = build_proposal_id(&entry, &context, &inputs());
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_proposal_id_varies_with_inputs() {
        let entry = entry(&[]);
        let context = context();
        let first = build_proposal_id(&entry, &context, &inputs());
        let other = json!({"to": "eve@example.com", "body": "secret"})
            .as_object()
            .cloned()
            .unwrap();
        assert_ne!(first, build_proposal_id(&entry, &context, &other));
    }

    #[test]
    fn test_redacted_fields_do_not_change_hash() {
        let entry = entry(&["body"]);
        let context = context();
        let first = build_proposal_id(&entry, &context, &inputs());
        let other = json!({"to": "bob@example.com", "body": "different secret"})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(first, build_proposal_id(&entry, &context, &other));
    }

    #[test]
    fn test_build_proposal_fields() {
        let entry = entry(&["body"]);
        let context = context();
        let proposal = build_proposal(&entry, &context, &inputs(), "review_required");
        assert_eq!(proposal.proposal_version, PROPOSAL_VERSION);
        assert_eq!(proposal.action_kind, CallTargetKind::Skill);
        assert_eq!(proposal.action_name, "send_email");
        assert_eq!(proposal.autonomy, "L1");
        assert_eq!(proposal.reason_for_review, "review_required");
        assert_eq!(proposal.redactions.inputs, vec!["body".to_string()]);
        assert_eq!(proposal.context.actor, "alice");
        assert!(proposal.expires_at > proposal.created_at);
    }

    #[test]
    fn test_approval_denial_classification() {
        let review = vec!["review_required".to_string()];
        assert_eq!(approval_denial_reason(&review), Some("review_required"));
        assert!(is_approval_only_denial(&review));

        let with_token = vec![
            "review_required".to_string(),
            "approval_token_expired".to_string(),
        ];
        assert!(is_approval_only_denial(&with_token));

        let mixed = vec![
            "review_required".to_string(),
            "rate_limit_exceeded".to_string(),
        ];
        assert!(!is_approval_only_denial(&mixed));
        assert_eq!(approval_denial_reason(&[]), None);
    }
}
