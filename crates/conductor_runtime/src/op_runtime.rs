//! Op execution runtime: validation, policy, approvals, adapter dispatch.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use conductor_approvals::{ApprovalRecorder, AttentionRouter, NullApprovalRecorder, build_proposal_id};
use conductor_policy::{build_policy_metadata, PolicyContext, PolicyEvaluator};
use conductor_protocol::{EntryStatus, SkillContext};
use conductor_registry::{ActionEntry, OpRegistryLoader, OpRuntimeEntry};
use conductor_schema::validate_value;

use crate::adapters::{ActionAdapter, AdapterCall, AdapterMap, EntrypointSpec};
use crate::approval_flow::{handle_approval_denial, record_approval_decision};
use crate::audit::{AuditLogger, AuditRecord, AuditSink, AuditStatus, TracingAuditSink};
use crate::error::ExecutionError;
use crate::hooks::RoutingHook;

/// Return payload for a successful op execution.
#[derive(Debug, Clone)]
pub struct OpExecutionResult {
    pub output: Map<String, Value>,
    pub duration_ms: u64,
}

/// Executes ops end-to-end: status gate, input validation, attention
/// preview, policy, approval bookkeeping, adapter dispatch, output
/// validation, audit.
pub struct OpRuntime {
    registry: Arc<OpRegistryLoader>,
    policy: Arc<dyn PolicyEvaluator>,
    adapters: AdapterMap,
    routing_hook: Arc<dyn RoutingHook>,
    attention_router: Arc<dyn AttentionRouter>,
    recorder: Arc<dyn ApprovalRecorder>,
    audit: AuditLogger,
}

impl OpRuntime {
    pub fn new(
        registry: Arc<OpRegistryLoader>,
        policy: Arc<dyn PolicyEvaluator>,
        routing_hook: Arc<dyn RoutingHook>,
        attention_router: Arc<dyn AttentionRouter>,
    ) -> Self {
        Self {
            registry,
            policy,
            adapters: AdapterMap::new(),
            routing_hook,
            attention_router,
            recorder: Arc::new(NullApprovalRecorder),
            audit: AuditLogger::new(Arc::new(TracingAuditSink)),
        }
    }

    pub fn register_adapter(
        mut self,
        runtime: impl Into<String>,
        adapter: Arc<dyn ActionAdapter>,
    ) -> Self {
        self.adapters.insert(runtime.into(), adapter);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ApprovalRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = AuditLogger::new(sink);
        self
    }

    pub fn registry(&self) -> &OpRegistryLoader {
        &self.registry
    }

    /// Execute an op by name and optional version.
    pub async fn execute(
        &self,
        name: &str,
        inputs: Map<String, Value>,
        context: SkillContext,
        version: Option<&str>,
    ) -> Result<OpExecutionResult, ExecutionError> {
        let entry = self.registry.get_op(name, version)?;
        self.execute_resolved(entry, inputs, context).await
    }

    pub(crate) async fn execute_resolved(
        &self,
        entry: Arc<OpRuntimeEntry>,
        inputs: Map<String, Value>,
        context: SkillContext,
    ) -> Result<OpExecutionResult, ExecutionError> {
        let start = Instant::now();
        let action = entry.as_ref() as &dyn ActionEntry;

        if entry.status != EntryStatus::Enabled {
            self.audit.record(
                action,
                &context,
                AuditStatus::Denied,
                AuditRecord {
                    inputs: Some(&inputs),
                    error: Some(format!("entry_{}", entry.status)),
                    ..Default::default()
                },
            );
            return Err(ExecutionError::EntryUnavailable {
                name: entry.definition.name.clone(),
                status: entry.status,
            });
        }

        if let Err(violation) =
            validate_value(&Value::Object(inputs.clone()), &entry.definition.inputs_schema, "inputs")
        {
            self.audit.record(
                action,
                &context,
                AuditStatus::Failed,
                AuditRecord {
                    inputs: Some(&inputs),
                    error: Some(violation.to_string()),
                    ..Default::default()
                },
            );
            return Err(violation.into());
        }

        if let Err(err) = self.routing_hook.preview(action, &context, &inputs).await {
            warn!(op = entry.definition.name.as_str(), error = %err, "attention preview failed");
        }

        let proposal_id = build_proposal_id(action, &context, &inputs);
        let policy_context = PolicyContext::from_context(&context, proposal_id);

        let decision = match self.policy.evaluate(action, &policy_context) {
            Ok(decision) => decision,
            Err(err) => {
                error!(
                    op = entry.definition.name.as_str(),
                    version = entry.definition.version.as_str(),
                    error = %err,
                    "policy evaluation failed"
                );
                let mut metadata = build_policy_metadata(&policy_context);
                metadata.insert("policy.error".to_string(), err.to_string());
                let reasons = vec!["policy_error".to_string()];
                self.audit.record(
                    action,
                    &context,
                    AuditStatus::Denied,
                    AuditRecord {
                        inputs: Some(&inputs),
                        error: Some(err.to_string()),
                        policy_reasons: Some(&reasons),
                        policy_metadata: Some(&metadata),
                        ..Default::default()
                    },
                );
                return Err(ExecutionError::PolicyError(err.to_string()));
            }
        };

        if !decision.allowed {
            handle_approval_denial(
                action,
                &context,
                &inputs,
                &decision,
                self.recorder.as_ref(),
                self.attention_router.as_ref(),
            )
            .await;
            record_approval_decision(action, &context, &decision, self.recorder.as_ref());
            self.audit.record(
                action,
                &context,
                AuditStatus::Denied,
                AuditRecord {
                    inputs: Some(&inputs),
                    error: Some(decision.reasons.join("; ")),
                    policy_reasons: Some(&decision.reasons),
                    policy_metadata: Some(&decision.metadata),
                    ..Default::default()
                },
            );
            return Err(ExecutionError::PolicyDenied {
                reasons: decision.reasons,
            });
        }
        record_approval_decision(action, &context, &decision, self.recorder.as_ref());

        let runtime_key = entry.definition.runtime.as_str();
        let adapter = match self.adapters.get(runtime_key) {
            Some(adapter) => Arc::clone(adapter),
            None => {
                let err = ExecutionError::AdapterMissing(runtime_key.to_string());
                self.audit.record(
                    action,
                    &context,
                    AuditStatus::Failed,
                    AuditRecord {
                        inputs: Some(&inputs),
                        error: Some(err.to_string()),
                        policy_reasons: Some(&decision.reasons),
                        policy_metadata: Some(&decision.metadata),
                        ..Default::default()
                    },
                );
                return Err(err);
            }
        };

        let call = AdapterCall {
            entry: action,
            entrypoint: EntrypointSpec::from_op(&entry.definition),
            inputs: &inputs,
            context: &context,
            invoker: None,
        };
        let output = match adapter.execute(call).await {
            Ok(output) => output,
            Err(err) => {
                self.audit.record(
                    action,
                    &context,
                    AuditStatus::Failed,
                    AuditRecord {
                        inputs: Some(&inputs),
                        error: Some(err.to_string()),
                        policy_reasons: Some(&decision.reasons),
                        policy_metadata: Some(&decision.metadata),
                        ..Default::default()
                    },
                );
                return Err(err.into());
            }
        };

        if let Err(violation) =
            validate_value(&Value::Object(output.clone()), &entry.definition.outputs_schema, "outputs")
        {
            self.audit.record(
                action,
                &context,
                AuditStatus::Failed,
                AuditRecord {
                    inputs: Some(&inputs),
                    outputs: Some(&output),
                    error: Some(violation.to_string()),
                    policy_reasons: Some(&decision.reasons),
                    policy_metadata: Some(&decision.metadata),
                    ..Default::default()
                },
            );
            return Err(violation.into());
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        self.audit.record(
            action,
            &context,
            AuditStatus::Success,
            AuditRecord {
                duration_ms: Some(duration_ms),
                inputs: Some(&inputs),
                outputs: Some(&output),
                policy_reasons: Some(&decision.reasons),
                policy_metadata: Some(&decision.metadata),
                ..Default::default()
            },
        );
        info!(
            op = entry.definition.name.as_str(),
            version = entry.definition.version.as_str(),
            duration_ms,
            status = "success",
            "op execution"
        );
        Ok(OpExecutionResult { output, duration_ms })
    }
}
