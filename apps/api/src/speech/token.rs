//! Short-lived JWT issuance from the speech vendor's STS endpoint.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

/// Lifetime requested for each token, in seconds.
const TOKEN_DURATION_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Token endpoint returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Token response has no jwt_token")]
    MissingToken,

    #[error("Speech credentials are not configured")]
    MissingCredentials,
}

#[derive(Clone)]
pub struct SpeechClient {
    client: Client,
    sts_url: String,
}

impl SpeechClient {
    pub fn new(sts_url: String) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client, sts_url })
    }

    /// Requests a token and returns the vendor's JSON body unchanged.
    pub async fn issue_token(&self, appid: &str, access_key: &str) -> Result<Value, SpeechError> {
        let response = self
            .client
            .post(&self.sts_url)
            .header("Authorization", format!("Bearer; {access_key}"))
            .json(&json!({ "appid": appid, "duration": TOKEN_DURATION_SECS }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        debug!("Issued speech token for app {appid}");
        Ok(body)
    }
}

/// Pulls the token string out of an STS response body.
pub fn jwt_token(body: &Value) -> Result<String, SpeechError> {
    body.get("jwt_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or(SpeechError::MissingToken)
}
