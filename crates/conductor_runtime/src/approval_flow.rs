//! Approval-denial handling shared by the skill and op runtimes.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::warn;

use conductor_approvals::{
    approval_denial_reason, build_proposal, is_approval_only_denial, ApprovalDecision,
    ApprovalRecorder, AttentionRouter, DecisionKind,
};
use conductor_policy::{PolicyDecision, META_PROPOSAL_ID, META_TOKEN_REASON, META_TOKEN_STATUS, META_TOKEN_VALID};
use conductor_protocol::SkillContext;
use conductor_registry::ActionEntry;

/// Build, record, and route a proposal for an approval-gated denial.
///
/// Runs only when the entry requires approval and every denial reason is
/// approval-related; mixed denials never enter the approval path. The
/// proposal is recorded before routing, so a routing failure costs only
/// the delivery, not the record.
pub(crate) async fn handle_approval_denial(
    entry: &dyn ActionEntry,
    context: &SkillContext,
    inputs: &Map<String, Value>,
    decision: &PolicyDecision,
    recorder: &dyn ApprovalRecorder,
    router: &dyn AttentionRouter,
) {
    if !entry.requires_approval() {
        return;
    }
    let reason = match approval_denial_reason(&decision.reasons) {
        Some(reason) => reason,
        None => return,
    };
    if !is_approval_only_denial(&decision.reasons) {
        return;
    }
    let proposal = build_proposal(entry, context, inputs, reason);
    recorder.record_proposal(&proposal);
    if let Err(err) = router.route(&proposal, context).await {
        warn!(
            proposal_id = proposal.proposal_id.as_str(),
            error = %err,
            "failed to route approval proposal"
        );
    }
}

/// Record the approval outcome tied to this evaluation, if any.
///
/// Allowed approval-gated runs record `approved` (crediting the token when
/// one satisfied the gate, the operator confirmation otherwise). Token
/// failures with a known proposal id and actor record `expired` or
/// `rejected` per token status. Anything else records nothing.
pub(crate) fn record_approval_decision(
    entry: &dyn ActionEntry,
    context: &SkillContext,
    decision: &PolicyDecision,
    recorder: &dyn ApprovalRecorder,
) {
    if !entry.requires_approval() {
        return;
    }
    let proposal_id = match decision.metadata.get(META_PROPOSAL_ID) {
        Some(proposal_id) if !proposal_id.is_empty() => proposal_id.clone(),
        _ => return,
    };
    let actor = match &context.actor {
        Some(actor) => actor.clone(),
        None => return,
    };

    let token_valid = decision.metadata.get(META_TOKEN_VALID).map(String::as_str) == Some("true");
    let token_status = decision
        .metadata
        .get(META_TOKEN_STATUS)
        .map(String::as_str)
        .unwrap_or_default();
    let token_reason = decision.metadata.get(META_TOKEN_REASON).cloned().filter(|r| !r.is_empty());

    if token_valid || context.confirmed {
        recorder.record_decision(&ApprovalDecision {
            proposal_id,
            actor,
            decision: DecisionKind::Approved,
            decided_at: Utc::now(),
            reason: Some(if token_valid { "approval_token" } else { "confirmed" }.to_string()),
            token_used: token_valid,
        });
        return;
    }

    if decision.reasons.iter().any(|reason| reason.starts_with("approval_token_")) {
        let kind = if token_status == "expired" {
            DecisionKind::Expired
        } else {
            DecisionKind::Rejected
        };
        recorder.record_decision(&ApprovalDecision {
            proposal_id,
            actor,
            decision: kind,
            decided_at: Utc::now(),
            reason: token_reason,
            token_used: true,
        });
    }
}
