//! Canonical types shared across the conductor workspace.
//!
//! Everything the registry, policy, approval, and runtime crates agree on
//! lives here: the definition schema for skills and ops, the per-invocation
//! [`SkillContext`], naming validators, canonical JSON serialization for
//! deterministic hashing, and workspace-wide default constants.

pub mod canonical;
pub mod context;
pub mod defaults;
pub mod naming;
pub mod types;

pub use context::SkillContext;
pub use types::{
    AutonomyLevel, CallTargetKind, CallTargetRef, CapabilityId, CapabilityRegistry, Deprecation,
    Entrypoint, EntrypointRuntime, EntryStatus, FailureMode, LogicSkillDefinition, OpDefinition,
    OpRegistry, OpRuntime, PipelineSkillDefinition, PipelineStep, RateLimit, Redaction,
    SkillDefinition, SkillKind, SkillRegistry,
};
