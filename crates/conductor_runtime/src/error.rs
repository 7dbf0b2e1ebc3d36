//! Execution failure taxonomy.

use thiserror::Error;

use conductor_protocol::EntryStatus;
use conductor_registry::RegistryError;
use conductor_schema::SchemaViolation;

use crate::adapters::AdapterError;

/// Terminal failure for a skill or op invocation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Input or output payload failed schema validation.
    #[error(transparent)]
    Validation(#[from] SchemaViolation),

    /// Policy evaluation denied the request.
    #[error("invocation denied by policy: {}", reasons.join("; "))]
    PolicyDenied { reasons: Vec<String> },

    /// The policy evaluator itself failed.
    #[error("invocation denied due to policy evaluation error: {0}")]
    PolicyError(String),

    /// Entry exists but is not enabled.
    #[error("{name} is {status}")]
    EntryUnavailable { name: String, status: EntryStatus },

    /// Composition gate: target was not statically declared.
    #[error("call target {target} not declared")]
    CallTargetNotAllowed { target: String },

    /// A nested op invocation was attempted without an op runtime.
    #[error("op runtime is not configured for call targets")]
    OpRuntimeMissing,

    /// No adapter registered for the entry's runtime selector.
    #[error("no adapter for runtime {0}")]
    AdapterMissing(String),

    /// The adapter ran and failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Pipeline interpretation failed.
    #[error("{message}")]
    Pipeline { code: &'static str, message: String },

    /// Registry resolution failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ExecutionError {
    /// Stable failure code for audit records and callers.
    pub fn code(&self) -> &str {
        match self {
            ExecutionError::Validation(violation) => violation.code,
            ExecutionError::PolicyDenied { .. } => "policy_denied",
            ExecutionError::PolicyError(_) => "policy_error",
            ExecutionError::EntryUnavailable { .. } => "entry_unavailable",
            ExecutionError::CallTargetNotAllowed { .. } => "call_target_not_allowed",
            ExecutionError::OpRuntimeMissing => "op_runtime_missing",
            ExecutionError::AdapterMissing(_) => "adapter_missing",
            ExecutionError::Adapter(error) => &error.code,
            ExecutionError::Pipeline { code, .. } => code,
            ExecutionError::Registry(error) => error.code(),
        }
    }
}
