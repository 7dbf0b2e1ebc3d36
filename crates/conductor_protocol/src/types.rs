//! Registry definition types (skill, op, and capability registries).
//!
//! These are the wire models for the JSON registry files. Deserialization is
//! strict (unknown fields are rejected); cross-field invariants are checked
//! by the `validate` methods, which report every violation instead of
//! stopping at the first.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::naming::{is_capability_id, is_semver, is_snake_case};

// ============================================================================
// Canonical Enums (used across all crates)
// ============================================================================

/// Availability status for a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Enabled,
    Disabled,
    Deprecated,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Enabled => "enabled",
            EntryStatus::Disabled => "disabled",
            EntryStatus::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Autonomy ceiling for an entry. Ordered: `L0 < L1 < L2 < L3`.
///
/// `L1` always requires explicit approval before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AutonomyLevel {
    L0,
    L1,
    L2,
    L3,
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::L0 => "L0",
            AutonomyLevel::L1 => "L1",
            AutonomyLevel::L2 => "L2",
            AutonomyLevel::L3 => "L3",
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Skill kinds: logic skills run an entrypoint handler, pipeline skills run
/// a declarative DAG of steps over other skills and ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillKind {
    Logic,
    Pipeline,
}

/// Call target kinds for composition and pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallTargetKind {
    Skill,
    Op,
}

impl CallTargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallTargetKind::Skill => "skill",
            CallTargetKind::Op => "op",
        }
    }
}

impl fmt::Display for CallTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport selector for logic skill entrypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrypointRuntime {
    /// In-process handler registered in the native handler catalog.
    Native,
    Http,
    Script,
    Mcp,
}

impl EntrypointRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrypointRuntime::Native => "native",
            EntrypointRuntime::Http => "http",
            EntrypointRuntime::Script => "script",
            EntrypointRuntime::Mcp => "mcp",
        }
    }
}

/// Transport selector for op execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpRuntime {
    Native,
    Http,
    Script,
    Mcp,
}

impl OpRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpRuntime::Native => "native",
            OpRuntime::Http => "http",
            OpRuntime::Script => "script",
            OpRuntime::Mcp => "mcp",
        }
    }
}

// ============================================================================
// Capability Ids
// ============================================================================

/// Capability identifier in `domain.verb` form, e.g. `email.send`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(String);

impl CapabilityId {
    /// Build a validated capability id.
    pub fn new(id: impl Into<String>) -> Result<Self, CapabilityIdError> {
        let id = id.into();
        if !is_capability_id(&id) {
            return Err(CapabilityIdError::Invalid(id));
        }
        Ok(Self(id))
    }

    /// Wrap a raw string without validation. Registry value validation
    /// reports malformed ids; use [`CapabilityId::new`] elsewhere.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_well_formed(&self) -> bool {
        is_capability_id(&self.0)
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CapabilityId {
    type Err = CapabilityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityId::new(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityIdError {
    #[error("invalid capability id: {0}")]
    Invalid(String),
}

// ============================================================================
// Shared definition fragments
// ============================================================================

/// Rate limit configuration for a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimit {
    pub max_per_minute: u32,
}

impl RateLimit {
    fn validate(&self, label: &str, errors: &mut Vec<String>) {
        if self.max_per_minute < 1 {
            errors.push(format!("{label}: rate_limit.max_per_minute must be >= 1"));
        }
    }
}

/// Runtime-specific entrypoint metadata for a logic skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entrypoint {
    pub runtime: EntrypointRuntime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl Entrypoint {
    fn validate(&self, label: &str, errors: &mut Vec<String>) {
        match self.runtime {
            EntrypointRuntime::Native => {
                if self.module.is_none() || self.handler.is_none() {
                    errors.push(format!("{label}: native entrypoints require module and handler"));
                }
            }
            EntrypointRuntime::Http => {
                if self.url.is_none() {
                    errors.push(format!("{label}: http entrypoints require url"));
                }
            }
            EntrypointRuntime::Script => {
                if self.command.is_none() {
                    errors.push(format!("{label}: script entrypoints require command"));
                }
            }
            EntrypointRuntime::Mcp => {
                if self.tool.is_none() {
                    errors.push(format!("{label}: mcp entrypoints require tool"));
                }
            }
        }
    }
}

/// Redaction rules for audit and proposal payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Redaction {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Deprecation metadata, required for entries with `status=deprecated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deprecation {
    #[serde(default = "default_true")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_version: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Deprecation {
    fn validate(&self, label: &str, errors: &mut Vec<String>) {
        if let Some(version) = &self.removal_version {
            if !is_semver(version) {
                errors.push(format!("{label}: deprecation.removal_version must be semver"));
            }
        }
    }
}

/// Declared failure mode for an entry. Codes are snake_case and unique
/// within the entry; the retryable flag lets callers decide retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureMode {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub retryable: bool,
}

/// Reference to a skill or op by name and optional version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallTargetRef {
    pub kind: CallTargetKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl CallTargetRef {
    fn validate(&self, label: &str, errors: &mut Vec<String>) {
        if !is_snake_case(&self.name) {
            errors.push(format!("{label}: call target name must be snake_case"));
        }
        if let Some(version) = &self.version {
            if !is_semver(version) {
                errors.push(format!("{label}: call target version must be semver"));
            }
        }
    }
}

impl fmt::Display for CallTargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.kind,
            self.name,
            self.version.as_deref().unwrap_or("*")
        )
    }
}

/// Single pipeline step: a call target plus input/output wiring.
///
/// Input sources are `$inputs.<field>` or `$step.<id>.<field>`; output
/// destinations are `$outputs.<field>` or `$step.<id>.<field>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineStep {
    pub id: String,
    pub target: CallTargetRef,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

// ============================================================================
// Skill definitions (tagged union on `kind`)
// ============================================================================

/// Schema for logic skill definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogicSkillDefinition {
    pub kind: SkillKind,
    pub name: String,
    pub version: String,
    #[serde(default = "default_status")]
    pub status: EntryStatus,
    pub description: String,
    pub inputs_schema: serde_json::Value,
    pub outputs_schema: serde_json::Value,
    #[serde(default)]
    pub capabilities: Vec<CapabilityId>,
    #[serde(default)]
    pub side_effects: Vec<CapabilityId>,
    pub autonomy: AutonomyLevel,
    #[serde(default)]
    pub policy_tags: Vec<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    pub entrypoint: Entrypoint,
    pub call_targets: Vec<CallTargetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redaction: Option<Redaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<Deprecation>,
    pub failure_modes: Vec<FailureMode>,
}

fn default_status() -> EntryStatus {
    EntryStatus::Enabled
}

/// Schema for pipeline skill definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSkillDefinition {
    pub kind: SkillKind,
    pub name: String,
    pub version: String,
    #[serde(default = "default_status")]
    pub status: EntryStatus,
    pub description: String,
    pub inputs_schema: serde_json::Value,
    pub outputs_schema: serde_json::Value,
    #[serde(default)]
    pub capabilities: Vec<CapabilityId>,
    #[serde(default)]
    pub side_effects: Vec<CapabilityId>,
    pub autonomy: AutonomyLevel,
    #[serde(default)]
    pub policy_tags: Vec<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    pub steps: Vec<PipelineStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redaction: Option<Redaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<Deprecation>,
    pub failure_modes: Vec<FailureMode>,
}

/// Skill definition: a union discriminated by the `kind` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SkillDefinition {
    Logic(LogicSkillDefinition),
    Pipeline(PipelineSkillDefinition),
}

impl<'de> Deserialize<'de> for SkillDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let kind = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| de::Error::missing_field("kind"))?;
        match kind {
            "logic" => LogicSkillDefinition::deserialize(value)
                .map(SkillDefinition::Logic)
                .map_err(de::Error::custom),
            "pipeline" => PipelineSkillDefinition::deserialize(value)
                .map(SkillDefinition::Pipeline)
                .map_err(de::Error::custom),
            other => Err(de::Error::unknown_variant(other, &["logic", "pipeline"])),
        }
    }
}

impl SkillDefinition {
    pub fn kind(&self) -> SkillKind {
        match self {
            SkillDefinition::Logic(_) => SkillKind::Logic,
            SkillDefinition::Pipeline(_) => SkillKind::Pipeline,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SkillDefinition::Logic(def) => &def.name,
            SkillDefinition::Pipeline(def) => &def.name,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            SkillDefinition::Logic(def) => &def.version,
            SkillDefinition::Pipeline(def) => &def.version,
        }
    }

    pub fn status(&self) -> EntryStatus {
        match self {
            SkillDefinition::Logic(def) => def.status,
            SkillDefinition::Pipeline(def) => def.status,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            SkillDefinition::Logic(def) => &def.description,
            SkillDefinition::Pipeline(def) => &def.description,
        }
    }

    pub fn inputs_schema(&self) -> &serde_json::Value {
        match self {
            SkillDefinition::Logic(def) => &def.inputs_schema,
            SkillDefinition::Pipeline(def) => &def.inputs_schema,
        }
    }

    pub fn outputs_schema(&self) -> &serde_json::Value {
        match self {
            SkillDefinition::Logic(def) => &def.outputs_schema,
            SkillDefinition::Pipeline(def) => &def.outputs_schema,
        }
    }

    pub fn capabilities(&self) -> &[CapabilityId] {
        match self {
            SkillDefinition::Logic(def) => &def.capabilities,
            SkillDefinition::Pipeline(def) => &def.capabilities,
        }
    }

    pub fn side_effects(&self) -> &[CapabilityId] {
        match self {
            SkillDefinition::Logic(def) => &def.side_effects,
            SkillDefinition::Pipeline(def) => &def.side_effects,
        }
    }

    pub fn autonomy(&self) -> AutonomyLevel {
        match self {
            SkillDefinition::Logic(def) => def.autonomy,
            SkillDefinition::Pipeline(def) => def.autonomy,
        }
    }

    pub fn policy_tags(&self) -> &[String] {
        match self {
            SkillDefinition::Logic(def) => &def.policy_tags,
            SkillDefinition::Pipeline(def) => &def.policy_tags,
        }
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        match self {
            SkillDefinition::Logic(def) => def.rate_limit,
            SkillDefinition::Pipeline(def) => def.rate_limit,
        }
    }

    pub fn redaction(&self) -> Option<&Redaction> {
        match self {
            SkillDefinition::Logic(def) => def.redaction.as_ref(),
            SkillDefinition::Pipeline(def) => def.redaction.as_ref(),
        }
    }

    /// Value-level validation: naming, runtime selector fields, and the
    /// cross-field invariants shared by every entry kind.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let label = format!("skill {}", self.name());
        validate_shared(
            &label,
            self.name(),
            self.version(),
            self.status(),
            self.capabilities(),
            self.side_effects(),
            self.rate_limit().as_ref(),
            match self {
                SkillDefinition::Logic(def) => def.deprecation.as_ref(),
                SkillDefinition::Pipeline(def) => def.deprecation.as_ref(),
            },
            match self {
                SkillDefinition::Logic(def) => &def.failure_modes,
                SkillDefinition::Pipeline(def) => &def.failure_modes,
            },
            &mut errors,
        );
        match self {
            SkillDefinition::Logic(def) => {
                if def.kind != SkillKind::Logic {
                    errors.push(format!("{label}: kind must be logic"));
                }
                def.entrypoint.validate(&label, &mut errors);
                if def.call_targets.is_empty() {
                    errors.push(format!("{label}: logic skills require at least one call target"));
                }
                for target in &def.call_targets {
                    target.validate(&label, &mut errors);
                }
                if def.capabilities.is_empty() {
                    errors.push(format!("{label}: capabilities must not be empty"));
                }
            }
            SkillDefinition::Pipeline(def) => {
                if def.kind != SkillKind::Pipeline {
                    errors.push(format!("{label}: kind must be pipeline"));
                }
                if def.steps.is_empty() {
                    errors.push(format!("{label}: pipeline skills require at least one step"));
                }
                for step in &def.steps {
                    if !is_snake_case(&step.id) {
                        errors.push(format!("{label}: pipeline step id must be snake_case"));
                    }
                    step.target.validate(&format!("{label} step {}", step.id), &mut errors);
                }
                // Empty capabilities are allowed here: the loader fills them
                // from the computed closure during pipeline validation.
            }
        }
        errors
    }
}

// ============================================================================
// Op definitions
// ============================================================================

/// Schema for a single op definition entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpDefinition {
    pub name: String,
    pub version: String,
    #[serde(default = "default_status")]
    pub status: EntryStatus,
    pub description: String,
    pub inputs_schema: serde_json::Value,
    pub outputs_schema: serde_json::Value,
    pub capabilities: Vec<CapabilityId>,
    #[serde(default)]
    pub side_effects: Vec<CapabilityId>,
    pub autonomy: AutonomyLevel,
    #[serde(default)]
    pub policy_tags: Vec<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    pub runtime: OpRuntime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redaction: Option<Redaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation: Option<Deprecation>,
    pub failure_modes: Vec<FailureMode>,
}

impl OpDefinition {
    /// Value-level validation for an op definition.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let label = format!("op {}", self.name);
        validate_shared(
            &label,
            &self.name,
            &self.version,
            self.status,
            &self.capabilities,
            &self.side_effects,
            self.rate_limit.as_ref(),
            self.deprecation.as_ref(),
            &self.failure_modes,
            &mut errors,
        );
        if self.capabilities.is_empty() {
            errors.push(format!("{label}: capabilities must not be empty"));
        }
        match self.runtime {
            OpRuntime::Native => {
                if self.module.is_none() || self.handler.is_none() {
                    errors.push(format!("{label}: native ops require module and handler"));
                }
            }
            OpRuntime::Http => {
                if self.url.is_none() {
                    errors.push(format!("{label}: http ops require url"));
                }
            }
            OpRuntime::Script => {
                if self.command.is_none() {
                    errors.push(format!("{label}: script ops require command"));
                }
            }
            OpRuntime::Mcp => {
                if self.tool.is_none() {
                    errors.push(format!("{label}: mcp ops require tool"));
                }
            }
        }
        errors
    }
}

#[allow(clippy::too_many_arguments)]
fn validate_shared(
    label: &str,
    name: &str,
    version: &str,
    status: EntryStatus,
    capabilities: &[CapabilityId],
    side_effects: &[CapabilityId],
    rate_limit: Option<&RateLimit>,
    deprecation: Option<&Deprecation>,
    failure_modes: &[FailureMode],
    errors: &mut Vec<String>,
) {
    if !is_snake_case(name) {
        errors.push(format!("{label}: name must be snake_case"));
    }
    if !is_semver(version) {
        errors.push(format!("{label}: version must be semver"));
    }
    for cap in capabilities.iter().chain(side_effects) {
        if !cap.is_well_formed() {
            errors.push(format!("{label}: invalid capability id: {cap}"));
        }
    }
    for effect in side_effects {
        if !capabilities.contains(effect) {
            errors.push(format!("{label}: side_effects must be a subset of capabilities"));
        }
    }
    if let Some(rate_limit) = rate_limit {
        rate_limit.validate(label, errors);
    }
    if status == EntryStatus::Deprecated && deprecation.is_none() {
        errors.push(format!("{label}: deprecated entries must include deprecation metadata"));
    }
    if let Some(deprecation) = deprecation {
        deprecation.validate(label, errors);
    }
    if failure_modes.is_empty() {
        errors.push(format!("{label}: at least one failure mode is required"));
    }
    let mut seen_codes = Vec::new();
    for mode in failure_modes {
        if !is_snake_case(&mode.code) {
            errors.push(format!("{label}: failure mode code must be snake_case: {}", mode.code));
        }
        if seen_codes.contains(&mode.code.as_str()) {
            errors.push(format!("{label}: duplicate failure mode code: {}", mode.code));
        } else {
            seen_codes.push(mode.code.as_str());
        }
    }
}

// ============================================================================
// Registry file wrappers
// ============================================================================

/// Wire shape of the skill registry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkillRegistry {
    pub registry_version: String,
    pub skills: Vec<SkillDefinition>,
}

/// Wire shape of the op registry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpRegistry {
    pub registry_version: String,
    pub ops: Vec<OpDefinition>,
}

/// Wire shape of the capability registry file. Only `id` is consumed;
/// other per-capability metadata is tolerated and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRegistry {
    pub capabilities: Vec<CapabilityDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDecl {
    pub id: String,
}
