use anyhow::{Context, Result};
use serde_json::json;

use crate::config;

/// Transactional-email client for call-summary notifications. Optional: when
/// no recipient or API key is configured, `send` is a no-op.
pub struct Mailer {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    to: Option<String>,
}

impl Mailer {
    pub fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config::EMAIL_API_BASE.clone(),
            api_key: config::EMAIL_API_KEY.clone(),
            to: config::NOTIFY_EMAIL_TO.clone(),
        }
    }

    pub fn new(base_url: impl Into<String>, api_key: &str, to: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: Some(api_key.to_string()),
            to: Some(to.to_string()),
        }
    }

    pub async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let (Some(api_key), Some(to)) = (self.api_key.as_deref(), self.to.as_deref()) else {
            return Ok(());
        };
        self.http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({
                "from": "supportline <notifications@supportline.example>",
                "to": [to],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .context("sending notification email")?;
        Ok(())
    }
}
