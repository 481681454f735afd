use anyhow::{Context, Result};
use async_trait::async_trait;

use super::models::ProviderSubscription;
use crate::config;

/// Seam to the hosted billing API. The live implementation talks to the
/// provider over HTTPS; tests substitute a stub or an httpmock server.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription>;
}

/// Stripe-style REST client. Constructed once at process start and shared
/// across requests via an `Extension` layer; it holds no per-request state.
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl StripeClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            config::BILLING_API_BASE.as_str(),
            config::BILLING_API_KEY.as_str(),
        )
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn fetch_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription> {
        let url = format!("{}/v1/subscriptions/{}", self.base_url, subscription_id);
        let subscription = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("fetching subscription {subscription_id}"))?
            .json::<ProviderSubscription>()
            .await
            .context("decoding subscription payload")?;
        Ok(subscription)
    }
}
