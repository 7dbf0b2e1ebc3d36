//! Policy evaluation for skill and op invocation.
//!
//! Rules run in a fixed order and accumulate reason codes; a request is
//! allowed only when no rule objects. The evaluator also consumes approval
//! tokens: a valid token for the request's proposal id satisfies the
//! review gate, an invalid or expired one adds a token reason.

pub mod evaluator;
pub mod rate_limit;

pub use evaluator::{
    build_policy_metadata, DefaultPolicy, PolicyContext, PolicyDecision, PolicyEvalError,
    PolicyEvaluator, META_ACTOR, META_CHANNEL, META_PROPOSAL_ID, META_TOKEN_REASON,
    META_TOKEN_STATUS, META_TOKEN_VALID,
};
pub use rate_limit::RateLimiter;
