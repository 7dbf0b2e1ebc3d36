//! Composition gate: nested invocation of statically declared call targets.

use serde_json::{Map, Value};

use conductor_protocol::{CallTargetKind, SkillContext, SkillDefinition};
use conductor_registry::SkillRuntimeEntry;

use crate::error::ExecutionError;
use crate::op_runtime::{OpExecutionResult, OpRuntime};
use crate::runtime::{ExecutionResult, SkillRuntime};

/// Invocation handle bound to a logic skill's entry and context.
///
/// Handlers receive an invoker instead of runtime references; every nested
/// call is checked against the parent's declared `call_targets` before
/// dispatch, and the child runs under a capability-narrowed context.
pub struct Invoker<'r> {
    runtime: &'r SkillRuntime,
    op_runtime: Option<&'r OpRuntime>,
    parent_entry: &'r SkillRuntimeEntry,
    parent_context: &'r SkillContext,
}

impl<'r> Invoker<'r> {
    pub(crate) fn new(
        runtime: &'r SkillRuntime,
        op_runtime: Option<&'r OpRuntime>,
        parent_entry: &'r SkillRuntimeEntry,
        parent_context: &'r SkillContext,
    ) -> Self {
        Self {
            runtime,
            op_runtime,
            parent_entry,
            parent_context,
        }
    }

    /// Invoke a declared downstream skill.
    pub async fn invoke_skill(
        &self,
        name: &str,
        inputs: Map<String, Value>,
        version: Option<&str>,
    ) -> Result<ExecutionResult, ExecutionError> {
        ensure_call_target_allowed(self.parent_entry, CallTargetKind::Skill, name, version)?;
        let skill = self.runtime.registry().get_skill(name, version)?;
        let child_context = self.parent_context.child(skill.definition.capabilities());
        self.runtime.execute_resolved(skill, inputs, child_context).await
    }

    /// Invoke a declared downstream op.
    pub async fn invoke_op(
        &self,
        name: &str,
        inputs: Map<String, Value>,
        version: Option<&str>,
    ) -> Result<OpExecutionResult, ExecutionError> {
        ensure_call_target_allowed(self.parent_entry, CallTargetKind::Op, name, version)?;
        let op_runtime = self.op_runtime.ok_or(ExecutionError::OpRuntimeMissing)?;
        let op = op_runtime.registry().get_op(name, version)?;
        let child_context = self.parent_context.child(&op.definition.capabilities);
        op_runtime.execute_resolved(op, inputs, child_context).await
    }
}

/// Check a requested target against the parent's declared call targets.
///
/// A declared target without a version matches any requested version; a
/// pinned declaration matches only its own version.
pub fn ensure_call_target_allowed(
    parent: &SkillRuntimeEntry,
    kind: CallTargetKind,
    name: &str,
    version: Option<&str>,
) -> Result<(), ExecutionError> {
    let call_targets = match &parent.definition {
        SkillDefinition::Logic(def) => def.call_targets.as_slice(),
        SkillDefinition::Pipeline(_) => &[],
    };
    for target in call_targets {
        if target.kind != kind || target.name != name {
            continue;
        }
        match version {
            None => return Ok(()),
            Some(version) => {
                if target.version.as_deref().map_or(true, |v| v == version) {
                    return Ok(());
                }
            }
        }
    }
    Err(ExecutionError::CallTargetNotAllowed {
        target: format!("{kind}:{name}@{}", version.unwrap_or("*")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parent(call_targets: serde_json::Value) -> SkillRuntimeEntry {
        let definition: SkillDefinition = serde_json::from_value(json!({
            "kind": "logic",
            "name": "parent",
            "version": "1.0.0",
            "description": "parent",
            "inputs_schema": {"type": "object"},
            "outputs_schema": {"type": "object"},
            "capabilities": ["test.run"],
            "autonomy": "L3",
            "entrypoint": {"runtime": "native", "module": "m", "handler": "h"},
            "call_targets": call_targets,
            "failure_modes": [{"code": "failed", "description": "failed"}]
        }))
        .unwrap();
        SkillRuntimeEntry {
            status: definition.status(),
            autonomy: definition.autonomy(),
            rate_limit: None,
            channels: None,
            actors: None,
            definition,
        }
    }

    #[test]
    fn test_declared_target_allowed() {
        let entry = parent(json!([{"kind": "skill", "name": "child"}]));
        assert!(ensure_call_target_allowed(&entry, CallTargetKind::Skill, "child", None).is_ok());
        // Unpinned declaration admits any requested version.
        assert!(
            ensure_call_target_allowed(&entry, CallTargetKind::Skill, "child", Some("2.0.0")).is_ok()
        );
    }

    #[test]
    fn test_undeclared_target_rejected() {
        let entry = parent(json!([{"kind": "skill", "name": "child"}]));
        let err =
            ensure_call_target_allowed(&entry, CallTargetKind::Op, "child", None).unwrap_err();
        assert_eq!(err.code(), "call_target_not_allowed");
        assert!(ensure_call_target_allowed(&entry, CallTargetKind::Skill, "other", None).is_err());
    }

    #[test]
    fn test_version_pinning() {
        let entry = parent(json!([{"kind": "op", "name": "child", "version": "1.0.0"}]));
        assert!(ensure_call_target_allowed(&entry, CallTargetKind::Op, "child", Some("1.0.0")).is_ok());
        assert!(
            ensure_call_target_allowed(&entry, CallTargetKind::Op, "child", Some("2.0.0")).is_err()
        );
        // An unpinned request against a pinned declaration is allowed.
        assert!(ensure_call_target_allowed(&entry, CallTargetKind::Op, "child", None).is_ok());
    }
}
