//! In-process handler table and adapter for the `native` runtime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::timeout;

use conductor_protocol::defaults::DEFAULT_ADAPTER_TIMEOUT_SECS;
use conductor_protocol::SkillContext;
use conductor_registry::NativeCatalog;

use super::{ActionAdapter, AdapterCall, AdapterError};
use crate::composition::Invoker;

/// An in-process handler. Logic skill handlers receive the invoker to
/// compose declared call targets; op handlers can ignore it.
#[async_trait]
pub trait NativeHandler: Send + Sync {
    async fn call(
        &self,
        inputs: &Map<String, Value>,
        context: &SkillContext,
        invoker: Option<&Invoker>,
    ) -> Result<Map<String, Value>, AdapterError>;
}

/// Wrapper turning a plain synchronous function into a handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> NativeHandler for FnHandler<F>
where
    F: Fn(&Map<String, Value>, &SkillContext) -> Result<Map<String, Value>, AdapterError>
        + Send
        + Sync,
{
    async fn call(
        &self,
        inputs: &Map<String, Value>,
        context: &SkillContext,
        _invoker: Option<&Invoker>,
    ) -> Result<Map<String, Value>, AdapterError> {
        (self.0)(inputs, context)
    }
}

/// Handler table keyed by module and handler name. Built once at
/// composition time, then shared read-only.
#[derive(Default)]
pub struct NativeHandlerTable {
    modules: HashMap<String, HashMap<String, Arc<dyn NativeHandler>>>,
}

impl NativeHandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        module: impl Into<String>,
        handler: impl Into<String>,
        implementation: Arc<dyn NativeHandler>,
    ) {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(handler.into(), implementation);
    }

    fn module(&self, module: &str) -> Option<&HashMap<String, Arc<dyn NativeHandler>>> {
        self.modules.get(module)
    }
}

impl NativeCatalog for NativeHandlerTable {
    fn resolves(&self, module: &str, handler: &str) -> bool {
        self.module(module).is_some_and(|handlers| handlers.contains_key(handler))
    }
}

/// Adapter for in-process native handlers.
pub struct NativeAdapter {
    table: Arc<NativeHandlerTable>,
    timeout: Duration,
}

impl NativeAdapter {
    pub fn new(table: Arc<NativeHandlerTable>) -> Self {
        Self {
            table,
            timeout: Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ActionAdapter for NativeAdapter {
    async fn execute(&self, call: AdapterCall<'_>) -> Result<Map<String, Value>, AdapterError> {
        let (module, handler_name) = match (call.entrypoint.module, call.entrypoint.handler) {
            (Some(module), Some(handler)) => (module, handler),
            _ => {
                return Err(AdapterError::new(
                    "invalid_entrypoint",
                    "native entrypoint requires module and handler",
                ))
            }
        };

        let handlers = self.table.module(module).ok_or_else(|| {
            AdapterError::new(
                "module_import_failed",
                format!("module {module} is not registered"),
            )
        })?;
        let handler = handlers.get(handler_name).ok_or_else(|| {
            AdapterError::new(
                "handler_missing",
                format!("handler {handler_name} not found in {module}"),
            )
        })?;

        timeout(self.timeout, handler.call(call.inputs, call.context, call.invoker))
            .await
            .map_err(|_| AdapterError::timeout("native"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_protocol::SkillContext;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn echo(inputs: &Map<String, Value>, _context: &SkillContext) -> Result<Map<String, Value>, AdapterError> {
        Ok(inputs.clone())
    }

    fn table() -> Arc<NativeHandlerTable> {
        let mut table = NativeHandlerTable::new();
        table.register("email", "send", Arc::new(FnHandler(echo)));
        Arc::new(table)
    }

    #[test]
    fn test_catalog_resolution() {
        let table = table();
        assert!(table.resolves("email", "send"));
        assert!(!table.resolves("email", "receive"));
        assert!(!table.resolves("files", "send"));
    }

    #[tokio::test]
    async fn test_missing_module_and_handler_codes() {
        let adapter = NativeAdapter::new(table());
        let inputs = json!({}).as_object().cloned().unwrap();
        let context = SkillContext::new(BTreeSet::new());

        let call = |module: Option<&'static str>, handler: Option<&'static str>| AdapterCall {
            entry: test_entry(),
            entrypoint: super::super::EntrypointSpec {
                runtime: "native",
                module,
                handler,
                url: None,
                command: None,
                tool: None,
            },
            inputs: &inputs,
            context: &context,
            invoker: None,
        };

        let err = adapter.execute(call(Some("files"), Some("send"))).await.unwrap_err();
        assert_eq!(err.code, "module_import_failed");
        let err = adapter.execute(call(Some("email"), Some("receive"))).await.unwrap_err();
        assert_eq!(err.code, "handler_missing");
        let err = adapter.execute(call(None, None)).await.unwrap_err();
        assert_eq!(err.code, "invalid_entrypoint");
    }

    fn test_entry() -> &'static dyn conductor_registry::ActionEntry {
        static ENTRY: std::sync::OnceLock<conductor_registry::OpRuntimeEntry> =
            std::sync::OnceLock::new();
        ENTRY.get_or_init(|| {
            let definition: conductor_protocol::OpDefinition = serde_json::from_value(json!({
                "name": "noop",
                "version": "1.0.0",
                "description": "noop",
                "inputs_schema": {"type": "object"},
                "outputs_schema": {"type": "object"},
                "capabilities": ["test.noop"],
                "autonomy": "L3",
                "runtime": "native",
                "module": "noop",
                "handler": "noop",
                "failure_modes": [{"code": "noop_failed", "description": "noop"}]
            }))
            .unwrap();
            conductor_registry::OpRuntimeEntry {
                status: definition.status,
                autonomy: definition.autonomy,
                rate_limit: None,
                channels: None,
                actors: None,
                definition,
            }
        })
    }
}
