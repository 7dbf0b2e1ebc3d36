//! Skill & op execution runtimes.
//!
//! The runtimes resolve an action from its registry, validate inputs and
//! outputs against the declared schemas, evaluate the policy stack, route
//! approval proposals when a gated request is denied, dispatch through a
//! transport adapter (or interpret a pipeline), and emit one redacted
//! audit event per terminal state.
//!
//! Composition wiring is explicit: a host constructs an [`OpRuntime`] and
//! a [`SkillRuntime`], registers adapters per runtime selector, and passes
//! the routing hook and attention router it wants previews and proposals
//! delivered to.

pub mod adapters;
mod approval_flow;
pub mod audit;
pub mod composition;
pub mod error;
pub mod hooks;
pub mod op_runtime;
pub mod runtime;

pub use adapters::{
    ActionAdapter, AdapterCall, AdapterError, AdapterMap, EntrypointSpec, FnHandler, HttpAdapter,
    McpAdapter, NativeAdapter, NativeHandler, NativeHandlerTable, ScriptAdapter, ToolTransport,
    ToolTransportError,
};
pub use audit::{
    AuditEvent, AuditLogger, AuditRecord, AuditSink, AuditStatus, InMemoryAuditSink,
    TracingAuditSink,
};
pub use composition::{ensure_call_target_allowed, Invoker};
pub use error::ExecutionError;
pub use hooks::{LoggingRoutingHook, RoutingHook};
pub use op_runtime::{OpExecutionResult, OpRuntime};
pub use runtime::{ExecutionResult, SkillRuntime};
