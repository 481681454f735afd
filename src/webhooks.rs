use axum::{extract::Extension, http::HeaderMap, Json};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, warn};

use crate::billing::{BillingProvider, BillingService, ProviderSubscription};
use crate::db::webhook_events;
use crate::error::{AppError, AppResult};

/// Billing-provider event webhook. Signature verification happens against the
/// raw body before anything else; an unverified event causes no reads or
/// writes at all.
pub async fn billing_webhook(
    Extension(pool): Extension<PgPool>,
    Extension(provider): Extension<Arc<dyn BillingProvider>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> AppResult<Json<Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::BadRequest("Missing signature".into()))?;
    let secret = crate::config::BILLING_WEBHOOK_SECRET.as_str();
    if !verify_billing_signature(secret, signature, &body) {
        return Err(AppError::BadRequest("Bad signature".into()));
    }

    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {e}")))?;
    let event_type = event
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(AppError::BadRequest("Missing event type".into()))?
        .to_string();
    let event_id = event.get("id").and_then(|v| v.as_str());

    if let Err(e) = webhook_events::record(&pool, "billing", &event_type, event_id, &event).await {
        warn!(?e, event_type, "failed to record billing webhook event");
    }

    let service = BillingService::new(pool);
    match event_type.as_str() {
        "checkout.session.completed" => {
            handle_checkout_completed(&service, provider.as_ref(), &event).await?;
        }
        "customer.subscription.updated" | "customer.subscription.deleted" => {
            handle_subscription_lifecycle(&service, &event).await?;
        }
        // Re-deliveries of these and all unrecognized event types are acked
        // so the provider stops retrying.
        _ => {}
    }

    Ok(Json(json!({ "received": true })))
}

async fn handle_checkout_completed(
    service: &BillingService,
    provider: &dyn BillingProvider,
    event: &Value,
) -> AppResult<()> {
    let object = event
        .pointer("/data/object")
        .ok_or(AppError::BadRequest("Missing event object".into()))?;
    let account_id: i32 = object
        .get("client_reference_id")
        .and_then(|v| v.as_str())
        .and_then(|v| v.parse().ok())
        .ok_or(AppError::BadRequest("Missing client reference".into()))?;
    let subscription_id = object
        .get("subscription")
        .and_then(|v| v.as_str())
        .ok_or(AppError::BadRequest("Missing subscription id".into()))?;

    // The checkout event only carries the subscription id; the full object
    // (plan, period bounds, cancel flag) comes from the billing API.
    let subscription = provider
        .fetch_subscription(subscription_id)
        .await
        .map_err(|e| {
            error!(?e, subscription_id, "billing API fetch failed");
            AppError::Message("billing provider unavailable".into())
        })?;

    service
        .upsert_mirror(account_id, &subscription)
        .await
        .map_err(|e| AppError::Message(format!("mirror upsert failed: {e}")))?;
    Ok(())
}

async fn handle_subscription_lifecycle(service: &BillingService, event: &Value) -> AppResult<()> {
    let object = event
        .pointer("/data/object")
        .cloned()
        .ok_or(AppError::BadRequest("Missing event object".into()))?;
    let subscription: ProviderSubscription = serde_json::from_value(object)
        .map_err(|e| AppError::BadRequest(format!("Invalid subscription object: {e}")))?;

    let updated = service
        .refresh_mirror(&subscription)
        .await
        .map_err(|e| AppError::Message(format!("mirror refresh failed: {e}")))?;
    if updated.is_none() {
        // Lifecycle event for a subscription we never saw a checkout for.
        warn!(subscription_id = %subscription.id, "no mirror row for subscription event");
    }
    Ok(())
}

/// Verify the provider's `t=<unix>,v1=<hex>` signature header: HMAC-SHA256 of
/// `"{t}.{body}"` under the shared endpoint secret.
pub fn verify_billing_signature(secret: &str, header: &str, body: &[u8]) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut timestamp = None;
    let mut provided = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => provided = Some(value),
            _ => {}
        }
    }
    let (Some(timestamp), Some(provided)) = (timestamp, provided) else {
        return false;
    };

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can use any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    expected == provided
}

#[cfg(test)]
mod tests {
    use super::verify_billing_signature;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(body);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_accepted() {
        let body = br#"{"type":"checkout.session.completed"}"#;
        let header = sign("whsec_test", "1700000000", body);
        assert!(verify_billing_signature("whsec_test", &header, body));
    }

    #[test]
    fn tampered_body_rejected() {
        let header = sign("whsec_test", "1700000000", b"{\"a\":1}");
        assert!(!verify_billing_signature("whsec_test", &header, b"{\"a\":2}"));
    }

    #[test]
    fn wrong_secret_rejected() {
        let body = b"{}";
        let header = sign("whsec_other", "1700000000", body);
        assert!(!verify_billing_signature("whsec_test", &header, body));
    }

    #[test]
    fn malformed_header_rejected() {
        assert!(!verify_billing_signature("whsec_test", "v1=deadbeef", b"{}"));
        assert!(!verify_billing_signature("whsec_test", "t=1700000000", b"{}"));
        assert!(!verify_billing_signature("whsec_test", "", b"{}"));
    }
}
