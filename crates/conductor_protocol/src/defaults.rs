//! Canonical default values shared across the workspace.

/// Per-call adapter timeout.
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 30;

/// Approval proposal and token time-to-live.
pub const DEFAULT_APPROVAL_TTL_SECS: i64 = 3600;

/// Version stamp carried by every approval proposal.
pub const PROPOSAL_VERSION: &str = "1.0";

/// Policy tag that forces review before execution.
pub const REQUIRES_REVIEW_TAG: &str = "requires_review";

/// Sentinel written over redacted fields in audit payloads.
pub const AUDIT_REDACTED_SENTINEL: &str = "[REDACTED]";

/// Sentinel substituted for redacted fields in proposal-id hashing.
pub const PROPOSAL_REDACTED_SENTINEL: &str = "<redacted>";
