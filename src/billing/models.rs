use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Local mirror of a billing-provider subscription, keyed by the provider's
/// subscription id. Never the source of truth: every field except
/// `account_id` is overwritten by the most recent webhook processed for that
/// subscription.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionMirror {
    pub id: Uuid,
    pub account_id: i32,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: String,
    pub plan: Option<String>,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionMirror {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.status != "active" && self.status != "trialing" {
            return false;
        }
        if self.cancel_at_period_end {
            return false;
        }
        if let Some(end) = self.current_period_end {
            if end <= now {
                return false;
            }
        }
        true
    }
}

/// Subscription object as the billing provider's REST API returns it. Period
/// bounds arrive as unix seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: ProviderSubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSubscriptionItems {
    #[serde(default)]
    pub data: Vec<ProviderSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscriptionItem {
    pub price: ProviderPrice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPrice {
    pub id: String,
}

impl ProviderSubscription {
    /// Price id of the first subscription item, which is what the dashboard
    /// shows as the plan.
    pub fn plan_code(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }

    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}
