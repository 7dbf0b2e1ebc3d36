//! Attention router seam: delivers proposals to a human review surface.

use async_trait::async_trait;
use thiserror::Error;

use conductor_protocol::SkillContext;

use crate::proposal::ApprovalProposal;

#[derive(Debug, Error)]
#[error("attention routing failed: {0}")]
pub struct RoutingError(pub String);

/// Delivery seam for approval proposals.
///
/// Routing happens after the proposal is recorded; a routing failure fails
/// only the current request, never the recorded proposal.
#[async_trait]
pub trait AttentionRouter: Send + Sync {
    async fn route(
        &self,
        proposal: &ApprovalProposal,
        context: &SkillContext,
    ) -> Result<(), RoutingError>;
}
