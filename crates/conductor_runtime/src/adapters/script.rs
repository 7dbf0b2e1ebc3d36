//! Script adapter: run a subprocess, feed inputs on stdin, parse stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use conductor_protocol::defaults::DEFAULT_ADAPTER_TIMEOUT_SECS;

use super::{ActionAdapter, AdapterCall, AdapterError};

pub struct ScriptAdapter {
    timeout: Duration,
}

impl Default for ScriptAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptAdapter {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ActionAdapter for ScriptAdapter {
    async fn execute(&self, call: AdapterCall<'_>) -> Result<Map<String, Value>, AdapterError> {
        let command_line = call.entrypoint.command.ok_or_else(|| {
            AdapterError::new("invalid_entrypoint", "script entrypoint requires command")
        })?;
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            AdapterError::new("invalid_entrypoint", "script command is empty")
        })?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AdapterError::new("script_spawn_failed", format!("failed to spawn {program}: {err}"))
            })?;

        let payload = serde_json::to_vec(call.inputs).map_err(|err| {
            AdapterError::new("script_spawn_failed", format!("failed to encode inputs: {err}"))
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(|err| {
                AdapterError::new("script_failed", format!("failed to write inputs: {err}"))
            })?;
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::timeout("script"))?
            .map_err(|err| AdapterError::new("script_failed", format!("script failed: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::new(
                "script_failed",
                format!("{program} exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let payload: Value = serde_json::from_slice(&output.stdout).map_err(|err| {
            AdapterError::new("script_output_invalid", format!("invalid JSON on stdout: {err}"))
        })?;
        match payload {
            Value::Object(output) => Ok(output),
            other => Err(AdapterError::new(
                "script_output_invalid",
                format!("expected a JSON object on stdout, got {other}"),
            )),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::super::EntrypointSpec;
    use super::*;
    use conductor_protocol::SkillContext;
    use conductor_registry::{ActionEntry, OpRuntimeEntry};
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::OnceLock;

    fn test_entry() -> &'static dyn ActionEntry {
        static ENTRY: OnceLock<OpRuntimeEntry> = OnceLock::new();
        ENTRY.get_or_init(|| {
            let definition: conductor_protocol::OpDefinition = serde_json::from_value(json!({
                "name": "shell_op",
                "version": "1.0.0",
                "description": "shell op",
                "inputs_schema": {"type": "object"},
                "outputs_schema": {"type": "object"},
                "capabilities": ["shell.run"],
                "autonomy": "L3",
                "runtime": "script",
                "command": "cat",
                "failure_modes": [{"code": "shell_failed", "description": "shell failed"}]
            }))
            .unwrap();
            OpRuntimeEntry {
                status: definition.status,
                autonomy: definition.autonomy,
                rate_limit: None,
                channels: None,
                actors: None,
                definition,
            }
        })
    }

    fn call<'a>(
        command: Option<&'a str>,
        inputs: &'a Map<String, Value>,
        context: &'a SkillContext,
    ) -> AdapterCall<'a> {
        AdapterCall {
            entry: test_entry(),
            entrypoint: EntrypointSpec {
                runtime: "script",
                module: None,
                handler: None,
                url: None,
                command,
                tool: None,
            },
            inputs,
            context,
            invoker: None,
        }
    }

    #[tokio::test]
    async fn test_cat_round_trips_inputs() {
        let adapter = ScriptAdapter::new();
        let inputs = json!({"x": 1, "y": "two"}).as_object().cloned().unwrap();
        let context = SkillContext::new(BTreeSet::new());
        let output = adapter.execute(call(Some("cat"), &inputs, &context)).await.unwrap();
        assert_eq!(Value::Object(output), Value::Object(inputs));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let adapter = ScriptAdapter::new();
        let inputs = Map::new();
        let context = SkillContext::new(BTreeSet::new());
        let err = adapter
            .execute(call(Some("definitely-not-a-real-binary"), &inputs, &context))
            .await
            .unwrap_err();
        assert_eq!(err.code, "script_spawn_failed");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_script_failure() {
        let adapter = ScriptAdapter::new();
        let inputs = Map::new();
        let context = SkillContext::new(BTreeSet::new());
        let err = adapter.execute(call(Some("false"), &inputs, &context)).await.unwrap_err();
        assert_eq!(err.code, "script_failed");
    }

    #[tokio::test]
    async fn test_missing_command_is_invalid_entrypoint() {
        let adapter = ScriptAdapter::new();
        let inputs = Map::new();
        let context = SkillContext::new(BTreeSet::new());
        let err = adapter.execute(call(None, &inputs, &context)).await.unwrap_err();
        assert_eq!(err.code, "invalid_entrypoint");
    }
}
