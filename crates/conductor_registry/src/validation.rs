//! Cross-entry validation for base registries.

use std::collections::{BTreeMap, BTreeSet};

use conductor_protocol::naming::is_semver;
use conductor_protocol::{OpRegistry, SkillRegistry};

/// Name/version index over a loaded registry, used to resolve overlay
/// overrides and call targets.
#[derive(Debug, Clone, Default)]
pub struct RegistryIndex {
    names_to_versions: BTreeMap<String, BTreeSet<String>>,
}

impl RegistryIndex {
    pub fn from_skills(registry: &SkillRegistry) -> Self {
        let mut index = Self::default();
        for skill in &registry.skills {
            index.insert(skill.name(), skill.version());
        }
        index
    }

    pub fn from_ops(registry: &OpRegistry) -> Self {
        let mut index = Self::default();
        for op in &registry.ops {
            index.insert(&op.name, &op.version);
        }
        index
    }

    pub fn insert(&mut self, name: &str, version: &str) {
        self.names_to_versions
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string());
    }

    pub fn contains(&self, name: &str, version: Option<&str>) -> bool {
        match self.names_to_versions.get(name) {
            None => false,
            Some(versions) => match version {
                None => !versions.is_empty(),
                Some(version) => versions.contains(version),
            },
        }
    }
}

/// Validate the skill registry: per-entry value validation, duplicate
/// `name@version` detection, and capability cross-references.
pub fn validate_skill_registry(
    registry: &SkillRegistry,
    capability_ids: &BTreeSet<String>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if !is_semver(&registry.registry_version) {
        errors.push("registry_version must be semver".to_string());
    }

    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    for skill in &registry.skills {
        errors.extend(skill.validate());

        let key = (skill.name().to_string(), skill.version().to_string());
        if !seen.insert(key) {
            errors.push(format!(
                "duplicate skill entry for {}@{}",
                skill.name(),
                skill.version()
            ));
        }

        for cap in skill.capabilities().iter().chain(skill.side_effects()) {
            if !capability_ids.contains(cap.as_str()) {
                errors.push(format!("unknown capability: {cap} (skill {})", skill.name()));
            }
        }
    }
    errors
}

/// Validate the op registry with the same rules as skills.
pub fn validate_op_registry(registry: &OpRegistry, capability_ids: &BTreeSet<String>) -> Vec<String> {
    let mut errors = Vec::new();
    if !is_semver(&registry.registry_version) {
        errors.push("registry_version must be semver".to_string());
    }

    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    for op in &registry.ops {
        errors.extend(op.validate());

        let key = (op.name.clone(), op.version.clone());
        if !seen.insert(key) {
            errors.push(format!("duplicate op entry for {}@{}", op.name, op.version));
        }

        for cap in op.capabilities.iter().chain(&op.side_effects) {
            if !capability_ids.contains(cap.as_str()) {
                errors.push(format!("unknown capability: {cap} (op {})", op.name));
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capability_ids() -> BTreeSet<String> {
        ["email.send", "net.fetch"].iter().map(|s| s.to_string()).collect()
    }

    fn registry_json(skills: serde_json::Value) -> SkillRegistry {
        serde_json::from_value(json!({
            "registry_version": "1.0.0",
            "skills": skills
        }))
        .unwrap()
    }

    fn skill(name: &str, version: &str, capability: &str) -> serde_json::Value {
        json!({
            "kind": "logic",
            "name": name,
            "version": version,
            "description": "test",
            "inputs_schema": {"type": "object"},
            "outputs_schema": {"type": "object"},
            "capabilities": [capability],
            "autonomy": "L2",
            "entrypoint": {"runtime": "native", "module": "m", "handler": "h"},
            "call_targets": [{"kind": "op", "name": "noop"}],
            "failure_modes": [{"code": "failed", "description": "failed"}]
        })
    }

    #[test]
    fn test_valid_registry_passes() {
        let registry = registry_json(json!([skill("send_email", "1.0.0", "email.send")]));
        assert!(validate_skill_registry(&registry, &capability_ids()).is_empty());
    }

    #[test]
    fn test_duplicate_entries_reported() {
        let registry = registry_json(json!([
            skill("send_email", "1.0.0", "email.send"),
            skill("send_email", "1.0.0", "email.send")
        ]));
        let errors = validate_skill_registry(&registry, &capability_ids());
        assert!(errors.iter().any(|e| e.contains("duplicate skill entry")));
    }

    #[test]
    fn test_unknown_capability_reported() {
        let registry = registry_json(json!([skill("send_email", "1.0.0", "email.forge")]));
        let errors = validate_skill_registry(&registry, &capability_ids());
        assert!(errors.iter().any(|e| e.contains("unknown capability: email.forge")));
    }

    #[test]
    fn test_index_lookup() {
        let registry = registry_json(json!([
            skill("send_email", "1.0.0", "email.send"),
            skill("send_email", "2.0.0", "email.send")
        ]));
        let index = RegistryIndex::from_skills(&registry);
        assert!(index.contains("send_email", None));
        assert!(index.contains("send_email", Some("2.0.0")));
        assert!(!index.contains("send_email", Some("3.0.0")));
        assert!(!index.contains("other", None));
    }
}
