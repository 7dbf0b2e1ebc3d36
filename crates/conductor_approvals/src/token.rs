//! Approval tokens: issuance, validation, and the validator seam.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use conductor_protocol::defaults::DEFAULT_APPROVAL_TTL_SECS;

/// Approval token record scoped to a proposal and actor.
#[derive(Debug, Clone)]
pub struct ApprovalToken {
    pub token: String,
    pub actor: String,
    pub proposal_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Why a token failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenReason {
    Expired,
    ActorMismatch,
    ProposalMismatch,
    Unknown,
}

impl TokenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenReason::Expired => "expired",
            TokenReason::ActorMismatch => "actor_mismatch",
            TokenReason::ProposalMismatch => "proposal_mismatch",
            TokenReason::Unknown => "unknown",
        }
    }

    /// Public status label for policy metadata and decision records:
    /// everything but `expired` normalizes to `invalid`.
    pub fn public_label(&self) -> &'static str {
        match self {
            TokenReason::Expired => "expired",
            _ => "invalid",
        }
    }
}

/// Result of validating an approval token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenValidation {
    pub valid: bool,
    pub reason: Option<TokenReason>,
}

impl TokenValidation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: TokenReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Validation backend for approval tokens.
pub trait ApprovalTokenValidator: Send + Sync {
    fn validate(&self, token: &str, actor: &str, proposal_id: &str) -> TokenValidation;
}

/// Default validator: rejects every token.
#[derive(Debug, Default)]
pub struct NullApprovalTokenValidator;

impl ApprovalTokenValidator for NullApprovalTokenValidator {
    fn validate(&self, _token: &str, _actor: &str, _proposal_id: &str) -> TokenValidation {
        TokenValidation::invalid(TokenReason::Unknown)
    }
}

/// In-memory token store with TTL enforcement.
#[derive(Debug, Default)]
pub struct InMemoryApprovalTokenStore {
    tokens: Mutex<HashMap<String, ApprovalToken>>,
}

impl InMemoryApprovalTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for a proposal and actor with the default TTL.
    pub fn issue(&self, actor: &str, proposal_id: &str) -> String {
        self.issue_with_ttl(actor, proposal_id, DEFAULT_APPROVAL_TTL_SECS)
    }

    /// Issue a token with an explicit TTL in seconds.
    pub fn issue_with_ttl(&self, actor: &str, proposal_id: &str, ttl_seconds: i64) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let record = ApprovalToken {
            token: token.clone(),
            actor: actor.to_string(),
            proposal_id: proposal_id.to_string(),
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
        };
        lock_tokens(&self.tokens).insert(token.clone(), record);
        token
    }
}

impl ApprovalTokenValidator for InMemoryApprovalTokenStore {
    fn validate(&self, token: &str, actor: &str, proposal_id: &str) -> TokenValidation {
        let tokens = lock_tokens(&self.tokens);
        let record = match tokens.get(token) {
            Some(record) => record,
            None => return TokenValidation::invalid(TokenReason::Unknown),
        };
        if Utc::now() >= record.expires_at {
            return TokenValidation::invalid(TokenReason::Expired);
        }
        if record.actor != actor {
            return TokenValidation::invalid(TokenReason::ActorMismatch);
        }
        if record.proposal_id != proposal_id {
            return TokenValidation::invalid(TokenReason::ProposalMismatch);
        }
        TokenValidation::valid()
    }
}

fn lock_tokens(
    tokens: &Mutex<HashMap<String, ApprovalToken>>,
) -> std::sync::MutexGuard<'_, HashMap<String, ApprovalToken>> {
    match tokens.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_validate() {
        let store = InMemoryApprovalTokenStore::new();
        let token = store.issue("alice", "proposal-1");
        assert_eq!(store.validate(&token, "alice", "proposal-1"), TokenValidation::valid());
    }

    #[test]
    fn test_unknown_token() {
        let store = InMemoryApprovalTokenStore::new();
        let result = store.validate("nope", "alice", "proposal-1");
        assert_eq!(result.reason, Some(TokenReason::Unknown));
    }

    #[test]
    fn test_expired_token() {
        let store = InMemoryApprovalTokenStore::new();
        let token = store.issue_with_ttl("alice", "proposal-1", -1);
        let result = store.validate(&token, "alice", "proposal-1");
        assert_eq!(result.reason, Some(TokenReason::Expired));
        assert_eq!(result.reason.unwrap().public_label(), "expired");
    }

    #[test]
    fn test_actor_and_proposal_mismatch() {
        let store = InMemoryApprovalTokenStore::new();
        let token = store.issue("alice", "proposal-1");
        assert_eq!(
            store.validate(&token, "mallory", "proposal-1").reason,
            Some(TokenReason::ActorMismatch)
        );
        assert_eq!(
            store.validate(&token, "alice", "proposal-2").reason,
            Some(TokenReason::ProposalMismatch)
        );
        assert_eq!(TokenReason::ActorMismatch.public_label(), "invalid");
    }

    #[test]
    fn test_null_validator_rejects_all() {
        let validator = NullApprovalTokenValidator;
        assert!(!validator.validate("any", "alice", "p").valid);
    }
}
