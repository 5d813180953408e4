use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{check_status, BlocklistChecker, ClientError};
use crate::config::BlocklistConfig;

/// Google Safe Browsing v4 `threatMatches:find` client.
pub struct SafeBrowsingClient {
    client: Client,
    endpoint: String,
    config: BlocklistConfig,
}

impl SafeBrowsingClient {
    pub fn new(config: &BlocklistConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let endpoint = format!(
            "{}/v4/threatMatches:find",
            config.base_url.trim_end_matches('/')
        );
        Ok(Self {
            client,
            endpoint,
            config: config.clone(),
        })
    }

    pub fn request_body(&self, url: &str) -> Value {
        json!({
            "client": {
                "clientId": self.config.client_id,
                "clientVersion": self.config.client_version,
            },
            "threatInfo": {
                "threatTypes": self.config.threat_types,
                "platformTypes": self.config.platform_types,
                "threatEntryTypes": ["URL"],
                "threatEntries": [{ "url": url }],
            }
        })
    }
}

/// A response matches when it carries a non-empty `matches` array.
pub fn has_matches(body: &Value) -> bool {
    body.get("matches")
        .and_then(Value::as_array)
        .is_some_and(|m| !m.is_empty())
}

#[async_trait]
impl BlocklistChecker for SafeBrowsingClient {
    async fn lookup(&self, url: &str) -> Result<bool, ClientError> {
        let mut req = self.client.post(&self.endpoint).json(&self.request_body(url));
        if let Some(key) = &self.config.api_key {
            req = req.query(&[("key", key)]);
        }
        let resp = check_status("safe-browsing", req.send().await?).await?;
        let body: Value = resp.json().await?;
        Ok(has_matches(&body))
    }
}
