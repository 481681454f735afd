use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{ProviderSubscription, SubscriptionMirror};

/// Maintains the local subscription mirror. The mirror is written only from
/// verified billing webhooks; last write wins per subscription id.
#[derive(Clone)]
pub struct BillingService {
    pool: PgPool,
}

impl BillingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert-or-update the mirror row for a checkout that just completed.
    /// `account_id` is set on first insert and never overwritten afterwards.
    pub async fn upsert_mirror(
        &self,
        account_id: i32,
        subscription: &ProviderSubscription,
    ) -> Result<SubscriptionMirror> {
        let row = sqlx::query_as::<_, SubscriptionMirror>(
            r#"
            INSERT INTO subscriptions (
                id,
                account_id,
                stripe_subscription_id,
                stripe_customer_id,
                plan,
                status,
                current_period_start,
                current_period_end,
                cancel_at_period_end
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (stripe_subscription_id)
            DO UPDATE SET
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(&subscription.id)
        .bind(&subscription.customer)
        .bind(subscription.plan_code())
        .bind(&subscription.status)
        .bind(subscription.period_start())
        .bind(subscription.period_end())
        .bind(subscription.cancel_at_period_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Refresh a mirror row from a subscription lifecycle event. The owning
    /// account is not carried on these events, so this only updates the row
    /// the checkout webhook created; an unknown subscription id is reported
    /// as `None` for the caller to log.
    pub async fn refresh_mirror(
        &self,
        subscription: &ProviderSubscription,
    ) -> Result<Option<SubscriptionMirror>> {
        let row = sqlx::query_as::<_, SubscriptionMirror>(
            r#"
            UPDATE subscriptions
            SET stripe_customer_id = $2,
                plan = COALESCE($3, plan),
                status = $4,
                current_period_start = $5,
                current_period_end = $6,
                cancel_at_period_end = $7,
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING *
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.customer)
        .bind(subscription.plan_code())
        .bind(&subscription.status)
        .bind(subscription.period_start())
        .bind(subscription.period_end())
        .bind(subscription.cancel_at_period_end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Most recently updated mirror row for an account. Used by the usage
    /// endpoint to default its window to the current billing period.
    pub async fn mirror_for_account(&self, account_id: i32) -> Result<Option<SubscriptionMirror>> {
        let row = sqlx::query_as::<_, SubscriptionMirror>(
            r#"
            SELECT * FROM subscriptions
            WHERE account_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
