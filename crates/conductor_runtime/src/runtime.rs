//! Skill execution runtime: logic skills, pipelines, and composition.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use conductor_approvals::{ApprovalRecorder, AttentionRouter, NullApprovalRecorder, build_proposal_id};
use conductor_policy::{build_policy_metadata, PolicyContext, PolicyEvaluator};
use conductor_protocol::{
    CallTargetKind, EntryStatus, PipelineSkillDefinition, SkillContext, SkillDefinition,
};
use conductor_registry::{ActionEntry, SkillRegistryLoader, SkillRuntimeEntry};
use conductor_schema::validate_value;

use crate::adapters::{ActionAdapter, AdapterCall, AdapterMap, EntrypointSpec};
use crate::approval_flow::{handle_approval_denial, record_approval_decision};
use crate::audit::{AuditLogger, AuditRecord, AuditSink, AuditStatus, TracingAuditSink};
use crate::composition::Invoker;
use crate::error::ExecutionError;
use crate::hooks::RoutingHook;
use crate::op_runtime::OpRuntime;

/// Return payload for a successful skill execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: Map<String, Value>,
    pub duration_ms: u64,
}

type BoxedExecution<'a> =
    Pin<Box<dyn Future<Output = Result<ExecutionResult, ExecutionError>> + Send + 'a>>;

/// Executes skills end-to-end with schema validation, policy checks,
/// approval bookkeeping, and auditing. Pipeline skills are interpreted
/// step by step; logic skills dispatch through an adapter with a bound
/// [`Invoker`] for declared nested calls.
pub struct SkillRuntime {
    registry: Arc<SkillRegistryLoader>,
    policy: Arc<dyn PolicyEvaluator>,
    adapters: AdapterMap,
    op_runtime: Option<Arc<OpRuntime>>,
    routing_hook: Arc<dyn RoutingHook>,
    attention_router: Arc<dyn AttentionRouter>,
    recorder: Arc<dyn ApprovalRecorder>,
    audit: AuditLogger,
}

impl SkillRuntime {
    pub fn new(
        registry: Arc<SkillRegistryLoader>,
        policy: Arc<dyn PolicyEvaluator>,
        routing_hook: Arc<dyn RoutingHook>,
        attention_router: Arc<dyn AttentionRouter>,
    ) -> Self {
        Self {
            registry,
            policy,
            adapters: AdapterMap::new(),
            op_runtime: None,
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

    /// Attach the op runtime used for pipeline steps and `invoke_op`.
    pub fn with_op_runtime(mut self, op_runtime: Arc<OpRuntime>) -> Self {
        self.op_runtime = Some(op_runtime);
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

    pub fn registry(&self) -> &SkillRegistryLoader {
        &self.registry
    }

    /// Execute a skill by name and optional version.
    pub async fn execute(
        &self,
        name: &str,
        inputs: Map<String, Value>,
        context: SkillContext,
        version: Option<&str>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let entry = self.registry.get_skill(name, version)?;
        self.execute_resolved(entry, inputs, context).await
    }

    /// Run a resolved entry end-to-end. Boxed because pipelines and
    /// composition re-enter this path.
    pub(crate) fn execute_resolved<'a>(
        &'a self,
        entry: Arc<SkillRuntimeEntry>,
        inputs: Map<String, Value>,
        context: SkillContext,
    ) -> BoxedExecution<'a> {
        Box::pin(async move {
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
                    name: entry.definition.name().to_string(),
                    status: entry.status,
                });
            }

            if let Err(violation) = validate_value(
                &Value::Object(inputs.clone()),
                entry.definition.inputs_schema(),
                "inputs",
            ) {
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
                warn!(skill = entry.definition.name(), error = %err, "attention preview failed");
            }

            let proposal_id = build_proposal_id(action, &context, &inputs);
            let policy_context = PolicyContext::from_context(&context, proposal_id);

            let decision = match self.policy.evaluate(action, &policy_context) {
                Ok(decision) => decision,
                Err(err) => {
                    error!(
                        skill = entry.definition.name(),
                        version = entry.definition.version(),
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

            let dispatch = match &entry.definition {
                SkillDefinition::Pipeline(pipeline) => {
                    self.execute_pipeline(pipeline, &inputs, &context).await
                }
                SkillDefinition::Logic(def) => {
                    let runtime_key = def.entrypoint.runtime.as_str();
                    match self.adapters.get(runtime_key) {
                        None => Err(ExecutionError::AdapterMissing(runtime_key.to_string())),
                        Some(adapter) => {
                            let adapter = Arc::clone(adapter);
                            let invoker =
                                Invoker::new(self, self.op_runtime.as_deref(), &entry, &context);
                            let call = AdapterCall {
                                entry: action,
                                entrypoint: EntrypointSpec::from_skill(&def.entrypoint),
                                inputs: &inputs,
                                context: &context,
                                invoker: Some(&invoker),
                            };
                            adapter.execute(call).await.map_err(ExecutionError::from)
                        }
                    }
                }
            };
            let output = match dispatch {
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
                    return Err(err);
                }
            };

            if let Err(violation) = validate_value(
                &Value::Object(output.clone()),
                entry.definition.outputs_schema(),
                "outputs",
            ) {
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
                skill = entry.definition.name(),
                version = entry.definition.version(),
                duration_ms,
                status = "success",
                "skill execution"
            );
            Ok(ExecutionResult { output, duration_ms })
        })
    }

    /// Interpret a pipeline: steps run strictly in declaration order, each
    /// as a full child invocation under a narrowed context.
    async fn execute_pipeline(
        &self,
        pipeline: &PipelineSkillDefinition,
        inputs: &Map<String, Value>,
        context: &SkillContext,
    ) -> Result<Map<String, Value>, ExecutionError> {
        let mut pipeline_outputs = Map::new();
        let mut step_outputs: BTreeMap<String, Map<String, Value>> = BTreeMap::new();

        for step in &pipeline.steps {
            let mut step_inputs = Map::new();
            for (field, source) in &step.inputs {
                let value = resolve_pipeline_source(&step.id, source, inputs, &step_outputs)?;
                step_inputs.insert(field.clone(), value);
            }

            let payload = match step.target.kind {
                CallTargetKind::Skill => {
                    let target = self
                        .registry
                        .get_skill(&step.target.name, step.target.version.as_deref())?;
                    let child_context = context.child(target.definition.capabilities());
                    self.execute_resolved(target, step_inputs, child_context).await?.output
                }
                CallTargetKind::Op => {
                    let op_runtime =
                        self.op_runtime.as_ref().ok_or(ExecutionError::OpRuntimeMissing)?;
                    let op = op_runtime
                        .registry()
                        .get_op(&step.target.name, step.target.version.as_deref())?;
                    let child_context = context.child(&op.definition.capabilities);
                    op_runtime.execute_resolved(op, step_inputs, child_context).await?.output
                }
            };

            let mut step_payload = Map::new();
            for (output_name, destination) in &step.outputs {
                let value = payload.get(output_name).ok_or_else(|| ExecutionError::Pipeline {
                    code: "pipeline_output_missing",
                    message: format!("step {} missing output {output_name}", step.id),
                })?;
                step_payload.insert(output_name.clone(), value.clone());
                if let Some(pipeline_key) = destination.strip_prefix("$outputs.") {
                    pipeline_outputs.insert(pipeline_key.to_string(), value.clone());
                }
            }
            step_outputs.insert(step.id.clone(), step_payload);
        }

        Ok(pipeline_outputs)
    }
}

/// Resolve a step input source against the pipeline inputs and the outputs
/// published by earlier steps.
fn resolve_pipeline_source(
    step_id: &str,
    source: &str,
    inputs: &Map<String, Value>,
    step_outputs: &BTreeMap<String, Map<String, Value>>,
) -> Result<Value, ExecutionError> {
    if let Some(key) = source.strip_prefix("$inputs.") {
        return inputs.get(key).cloned().ok_or_else(|| ExecutionError::Pipeline {
            code: "pipeline_input_missing",
            message: format!("pipeline step {step_id} missing input {key}"),
        });
    }

    if let Some(tail) = source.strip_prefix("$step.") {
        let (source_step, field) = match tail.split_once('.') {
            Some(parts) => parts,
            None => {
                return Err(ExecutionError::Pipeline {
                    code: "pipeline_source_invalid",
                    message: format!("pipeline step {step_id} has invalid source {source}"),
                })
            }
        };
        let outputs = step_outputs.get(source_step).ok_or_else(|| ExecutionError::Pipeline {
            code: "pipeline_source_missing_step",
            message: format!("pipeline step {step_id} missing output from {source_step}"),
        })?;
        return outputs.get(field).cloned().ok_or_else(|| ExecutionError::Pipeline {
            code: "pipeline_source_missing_field",
            message: format!("pipeline step {step_id} missing output field {field}"),
        });
    }

    Err(ExecutionError::Pipeline {
        code: "pipeline_source_invalid",
        message: format!("pipeline step {step_id} has invalid source {source}"),
    })
}
