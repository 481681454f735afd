use serde_json::Value;
use sqlx::{Executor, Postgres};

/// Insert-only audit row for a verified inbound webhook. Failures here are
/// the caller's to swallow; the audit trail never blocks event processing.
pub async fn record<'c, E>(
    executor: E,
    provider: &str,
    event_type: &str,
    external_id: Option<&str>,
    payload: &Value,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO webhook_event_logs (provider, event_type, external_id, payload)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(provider)
    .bind(event_type)
    .bind(external_id)
    .bind(payload)
    .execute(executor)
    .await?;

    Ok(())
}
