//! External metadata lookup tool (OMDb-style title API).

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::SetupError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MetadataClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, SetupError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Look a title up by name. "not found" is an error result like any
    /// other backend failure.
    pub async fn lookup(&self, title: &str) -> Result<Value, String> {
        if self.api_key.is_empty() {
            return Err("metadata API key not configured".to_string());
        }

        debug!(title, "metadata lookup");

        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("t", title),
                ("plot", "full"),
            ])
            .send()
            .await
            .map_err(|e| format!("metadata request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("metadata endpoint returned HTTP {status}"));
        }

        let record: Value = response
            .json()
            .await
            .map_err(|e| format!("metadata response malformed: {e}"))?;

        // The API signals misses inside a 200 body.
        if record.get("Response").and_then(Value::as_str) == Some("False") {
            let reason = record
                .get("Error")
                .and_then(Value::as_str)
                .unwrap_or("title not found");
            return Err(reason.to_string());
        }

        Ok(record)
    }
}
