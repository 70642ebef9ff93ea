use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING};
use serde::Serialize;

use crate::modules::history::now_millis;

pub const DEFAULT_RELAY_URL: &str = "https://exp.host/--/api/v2/push/send";
pub const DEFAULT_TITLE: &str = "Test notification";
pub const DEFAULT_BODY: &str = "This is a test message from pushdeck";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushData {
    pub timestamp: String,
    pub test: String,
}

/// One message in the relay's JSON format.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub data: PushData,
    pub sound: String,
    pub badge: u32,
    pub priority: String,
}

impl PushMessage {
    pub fn test(token: impl Into<String>, title: Option<String>, body: Option<String>) -> Self {
        Self {
            to: token.into(),
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            data: PushData {
                timestamp: now_millis().to_string(),
                test: "true".to_string(),
            },
            sound: "default".to_string(),
            badge: 1,
            priority: "high".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts a single message. Any HTTP status counts as a response; only
    /// transport failures are errors.
    pub async fn send(&self, message: &PushMessage) -> Result<RelayResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .header(ACCEPT_ENCODING, "identity")
            .json(message)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
            .collect();
        let body = response.text().await.context("Reading relay response body")?;
        Ok(RelayResponse { status, headers, body })
    }
}
