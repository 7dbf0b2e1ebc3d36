//! Runtime entries: definitions merged with overlay-derived policy.

use std::collections::BTreeSet;
use std::sync::Arc;

use conductor_protocol::defaults::REQUIRES_REVIEW_TAG;
use conductor_protocol::{
    AutonomyLevel, CallTargetKind, CapabilityId, EntryStatus, OpDefinition, RateLimit, Redaction,
    SkillDefinition,
};

/// Allow/deny lists scoped to communication channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPolicy {
    pub allow: BTreeSet<String>,
    pub deny: BTreeSet<String>,
}

/// Allow/deny lists scoped to actors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorPolicy {
    pub allow: BTreeSet<String>,
    pub deny: BTreeSet<String>,
}

/// Resolved skill definition with effective policy metadata.
#[derive(Debug, Clone)]
pub struct SkillRuntimeEntry {
    pub definition: SkillDefinition,
    pub status: EntryStatus,
    pub autonomy: AutonomyLevel,
    pub rate_limit: Option<RateLimit>,
    pub channels: Option<ChannelPolicy>,
    pub actors: Option<ActorPolicy>,
}

/// Resolved op definition with effective policy metadata.
#[derive(Debug, Clone)]
pub struct OpRuntimeEntry {
    pub definition: OpDefinition,
    pub status: EntryStatus,
    pub autonomy: AutonomyLevel,
    pub rate_limit: Option<RateLimit>,
    pub channels: Option<ChannelPolicy>,
    pub actors: Option<ActorPolicy>,
}

/// Immutable snapshot of the skill registry.
#[derive(Debug, Clone)]
pub struct SkillRegistryView {
    pub registry_version: String,
    pub skills: Vec<Arc<SkillRuntimeEntry>>,
}

/// Immutable snapshot of the op registry.
#[derive(Debug, Clone)]
pub struct OpRegistryView {
    pub registry_version: String,
    pub ops: Vec<Arc<OpRuntimeEntry>>,
}

/// Common surface over skill and op entries.
///
/// Policy evaluation, approvals, and audit treat both kinds uniformly
/// through this trait.
pub trait ActionEntry: Send + Sync {
    fn kind(&self) -> CallTargetKind;
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn status(&self) -> EntryStatus;
    /// Effective autonomy after overlay overrides.
    fn autonomy(&self) -> AutonomyLevel;
    fn capabilities(&self) -> &[CapabilityId];
    fn side_effects(&self) -> &[CapabilityId];
    fn policy_tags(&self) -> &[String];
    /// Effective rate limit after overlay overrides.
    fn rate_limit(&self) -> Option<RateLimit>;
    fn channels(&self) -> Option<&ChannelPolicy>;
    fn actors(&self) -> Option<&ActorPolicy>;
    fn redaction(&self) -> Option<&Redaction>;

    /// True when execution needs an approval gate: `L1` autonomy always
    /// does, as does the `requires_review` policy tag.
    fn requires_approval(&self) -> bool {
        self.autonomy() == AutonomyLevel::L1
            || self.policy_tags().iter().any(|tag| tag == REQUIRES_REVIEW_TAG)
    }
}

impl ActionEntry for SkillRuntimeEntry {
    fn kind(&self) -> CallTargetKind {
        CallTargetKind::Skill
    }

    fn name(&self) -> &str {
        self.definition.name()
    }

    fn version(&self) -> &str {
        self.definition.version()
    }

    fn status(&self) -> EntryStatus {
        self.status
    }

    fn autonomy(&self) -> AutonomyLevel {
        self.autonomy
    }

    fn capabilities(&self) -> &[CapabilityId] {
        self.definition.capabilities()
    }

    fn side_effects(&self) -> &[CapabilityId] {
        self.definition.side_effects()
    }

    fn policy_tags(&self) -> &[String] {
        self.definition.policy_tags()
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    fn channels(&self) -> Option<&ChannelPolicy> {
        self.channels.as_ref()
    }

    fn actors(&self) -> Option<&ActorPolicy> {
        self.actors.as_ref()
    }

    fn redaction(&self) -> Option<&Redaction> {
        self.definition.redaction()
    }
}

impl ActionEntry for OpRuntimeEntry {
    fn kind(&self) -> CallTargetKind {
        CallTargetKind::Op
    }

    fn name(&self) -> &str {
        &self.definition.name
    }

    fn version(&self) -> &str {
        &self.definition.version
    }

    fn status(&self) -> EntryStatus {
        self.status
    }

    fn autonomy(&self) -> AutonomyLevel {
        self.autonomy
    }

    fn capabilities(&self) -> &[CapabilityId] {
        &self.definition.capabilities
    }

    fn side_effects(&self) -> &[CapabilityId] {
        &self.definition.side_effects
    }

    fn policy_tags(&self) -> &[String] {
        &self.definition.policy_tags
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    fn channels(&self) -> Option<&ChannelPolicy> {
        self.channels.as_ref()
    }

    fn actors(&self) -> Option<&ActorPolicy> {
        self.actors.as_ref()
    }

    fn redaction(&self) -> Option<&Redaction> {
        self.definition.redaction.as_ref()
    }
}
