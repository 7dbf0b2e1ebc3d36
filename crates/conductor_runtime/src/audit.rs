//! Structured, redacted audit records for every terminal state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use conductor_protocol::defaults::AUDIT_REDACTED_SENTINEL;
use conductor_protocol::{CallTargetKind, SkillContext};
use conductor_registry::ActionEntry;

/// Terminal status of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Denied,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Denied => "denied",
            AuditStatus::Failed => "failed",
        }
    }
}

/// One audit event per terminal state. Inputs and outputs are stored with
/// the entry's redaction applied; nothing else is reformatted.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub trace_id: String,
    pub span_id: String,
    pub action_kind: CallTargetKind,
    pub action: String,
    pub version: String,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub invocation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_invocation_id: Option<String>,
    pub capabilities: Vec<String>,
    pub side_effects: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_reasons: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_metadata: Option<BTreeMap<String, String>>,
}

/// Sink seam for audit events. Implementations must not tear records under
/// concurrent writes.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Default sink: one structured `info!` record per event.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &AuditEvent) {
        let payload = serde_json::to_string(event).unwrap_or_else(|_| String::from("{}"));
        info!(target: "conductor::audit", status = event.status.as_str(), event = %payload, "audit");
    }
}

/// Capturing sink for tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: &AuditEvent) {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}

/// Optional payloads attached to a record.
#[derive(Default)]
pub struct AuditRecord<'a> {
    pub duration_ms: Option<u64>,
    pub inputs: Option<&'a Map<String, Value>>,
    pub outputs: Option<&'a Map<String, Value>>,
    pub error: Option<String>,
    pub policy_reasons: Option<&'a [String]>,
    pub policy_metadata: Option<&'a BTreeMap<String, String>>,
}

/// Audit logger: builds redacted events and forwards them to the sink.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn record(
        &self,
        entry: &dyn ActionEntry,
        context: &SkillContext,
        status: AuditStatus,
        record: AuditRecord<'_>,
    ) {
        let input_fields = redaction_fields(entry, true);
        let output_fields = redaction_fields(entry, false);
        let event = AuditEvent {
            trace_id: context.trace_id.clone(),
            span_id: context.invocation_id.clone(),
            action_kind: entry.kind(),
            action: entry.name().to_string(),
            version: entry.version().to_string(),
            status,
            duration_ms: record.duration_ms,
            actor: context.actor.clone(),
            channel: context.channel.clone(),
            invocation_id: context.invocation_id.clone(),
            parent_invocation_id: context.parent_invocation_id.clone(),
            capabilities: entry.capabilities().iter().map(|c| c.to_string()).collect(),
            side_effects: entry.side_effects().iter().map(|c| c.to_string()).collect(),
            inputs: record.inputs.map(|payload| redact_payload(payload, &input_fields)),
            outputs: record.outputs.map(|payload| redact_payload(payload, &output_fields)),
            error: record.error,
            policy_reasons: record.policy_reasons.map(<[String]>::to_vec),
            policy_metadata: record.policy_metadata.cloned(),
        };
        self.sink.emit(&event);
    }
}

fn redaction_fields(entry: &dyn ActionEntry, inputs: bool) -> Vec<String> {
    entry
        .redaction()
        .map(|redaction| {
            if inputs {
                redaction.inputs.clone()
            } else {
                redaction.outputs.clone()
            }
        })
        .unwrap_or_default()
}

fn redact_payload(payload: &Map<String, Value>, fields: &[String]) -> Map<String, Value> {
    if fields.is_empty() {
        return payload.clone();
    }
    let mut redacted = payload.clone();
    for field in fields {
        if let Some(value) = redacted.get_mut(field) {
            *value = Value::String(AUDIT_REDACTED_SENTINEL.to_string());
        }
    }
    redacted
}
