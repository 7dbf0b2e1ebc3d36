//! Recorders for approval proposals and decisions.

use std::sync::Mutex;

use crate::proposal::{ApprovalDecision, ApprovalProposal};

/// Append-only persistence seam for proposals and decisions.
pub trait ApprovalRecorder: Send + Sync {
    fn record_proposal(&self, proposal: &ApprovalProposal);
    fn record_decision(&self, decision: &ApprovalDecision);
}

/// Recorder that drops everything.
#[derive(Debug, Default)]
pub struct NullApprovalRecorder;

impl ApprovalRecorder for NullApprovalRecorder {
    fn record_proposal(&self, _proposal: &ApprovalProposal) {}

    fn record_decision(&self, _decision: &ApprovalDecision) {}
}

/// In-memory recorder, mostly for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryApprovalRecorder {
    proposals: Mutex<Vec<ApprovalProposal>>,
    decisions: Mutex<Vec<ApprovalDecision>>,
}

impl InMemoryApprovalRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proposals(&self) -> Vec<ApprovalProposal> {
        lock(&self.proposals).clone()
    }

    pub fn decisions(&self) -> Vec<ApprovalDecision> {
        lock(&self.decisions).clone()
    }
}

impl ApprovalRecorder for InMemoryApprovalRecorder {
    fn record_proposal(&self, proposal: &ApprovalProposal) {
        lock(&self.proposals).push(proposal.clone());
    }

    fn record_decision(&self, decision: &ApprovalDecision) {
        lock(&self.decisions).push(decision.clone());
    }
}

fn lock<T>(mutex: &Mutex<Vec<T>>) -> std::sync::MutexGuard<'_, Vec<T>> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
