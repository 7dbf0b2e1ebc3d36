//! HTTP adapter: POST the inputs as JSON, expect a JSON object back.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::timeout;

use conductor_protocol::defaults::DEFAULT_ADAPTER_TIMEOUT_SECS;

use super::{ActionAdapter, AdapterCall, AdapterError};

pub struct HttpAdapter {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ActionAdapter for HttpAdapter {
    async fn execute(&self, call: AdapterCall<'_>) -> Result<Map<String, Value>, AdapterError> {
        let url = call.entrypoint.url.ok_or_else(|| {
            AdapterError::new("invalid_entrypoint", "http entrypoint requires url")
        })?;

        let request = self.client.post(url).json(call.inputs).send();
        let response = timeout(self.timeout, request)
            .await
            .map_err(|_| AdapterError::timeout("http"))?
            .map_err(|err| {
                if err.is_timeout() {
                    AdapterError::timeout("http")
                } else {
                    AdapterError::new("http_request_failed", format!("request to {url} failed: {err}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::new(
                "http_request_failed",
                format!("request to {url} returned {status}"),
            ));
        }

        let payload: Value = timeout(self.timeout, response.json())
            .await
            .map_err(|_| AdapterError::timeout("http"))?
            .map_err(|err| {
                AdapterError::new("http_response_invalid", format!("invalid JSON response: {err}"))
            })?;
        match payload {
            Value::Object(output) => Ok(output),
            other => Err(AdapterError::new(
                "http_response_invalid",
                format!("expected a JSON object, got {other}"),
            )),
        }
    }
}
