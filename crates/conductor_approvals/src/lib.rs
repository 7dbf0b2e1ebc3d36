//! Approval workflow: proposal artifacts, tokens, and decision records.
//!
//! When policy blocks an execution for approval reasons, the runtime builds
//! an [`ApprovalProposal`] whose id is a deterministic hash of the request
//! shape, records it, and hands it to an [`AttentionRouter`] for human
//! review. A token issued against that proposal id unlocks exactly the
//! request that produced it.

pub mod proposal;
pub mod recorder;
pub mod router;
pub mod token;

pub use proposal::{
    approval_denial_reason, build_proposal, build_proposal_id, is_approval_only_denial,
    ApprovalDecision, ApprovalProposal, DecisionKind, ProposalContext, ProposalRedactions,
};
pub use recorder::{ApprovalRecorder, InMemoryApprovalRecorder, NullApprovalRecorder};
pub use router::{AttentionRouter, RoutingError};
pub use token::{
    ApprovalToken, ApprovalTokenValidator, InMemoryApprovalTokenStore, NullApprovalTokenValidator,
    TokenReason, TokenValidation,
};
