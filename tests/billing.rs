use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::post;
use axum::{Extension, Router};
use hmac::{Hmac, Mac};
use httpmock::prelude::*;
use serde_json::json;
use sha2::Sha256;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceExt;

use supportline_backend::billing::{BillingProvider, BillingService, StripeClient};
use supportline_backend::webhooks;

const SECRET: &str = "whsec_test_secret";

fn set_test_env() {
    std::env::set_var("BILLING_WEBHOOK_SECRET", SECRET);
}

fn sign(body: &str) -> String {
    let timestamp = "1700000000";
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{body}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn billing_app(pool: PgPool, provider: Arc<dyn BillingProvider>) -> Router {
    Router::new()
        .route("/webhooks/billing", post(webhooks::billing_webhook))
        .layer(Extension(pool))
        .layer(Extension(provider))
}

async fn post_event(app: Router, body: String, signature: Option<String>) -> StatusCode {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    let response = app
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    response.status()
}

async fn seed_account(pool: &PgPool) -> i32 {
    sqlx::query_scalar("INSERT INTO accounts (email) VALUES ('owner@example.com') RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn checkout_completed_mirrors_the_subscription(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    set_test_env();
    let account_id = seed_account(&pool).await;

    let billing_api = MockServer::start();
    let fetch = billing_api.mock(|when, then| {
        when.method(GET).path("/v1/subscriptions/sub_new");
        then.status(200).json_body(json!({
            "id": "sub_new",
            "customer": "cus_new",
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "items": {"data": [{"price": {"id": "price_pro"}}]}
        }));
    });
    let provider: Arc<dyn BillingProvider> =
        Arc::new(StripeClient::new(billing_api.base_url(), "sk_test"));

    let body = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {"object": {
            "client_reference_id": account_id.to_string(),
            "subscription": "sub_new"
        }}
    })
    .to_string();
    let signature = sign(&body);

    let status = post_event(billing_app(pool.clone(), provider), body, Some(signature)).await;
    assert_eq!(status, StatusCode::OK);
    fetch.assert();

    let mirror = BillingService::new(pool.clone())
        .mirror_for_account(account_id)
        .await
        .unwrap()
        .expect("mirror row created");
    assert_eq!(mirror.stripe_subscription_id, "sub_new");
    assert_eq!(mirror.plan.as_deref(), Some("price_pro"));
    assert_eq!(mirror.status, "active");
    assert!(!mirror.cancel_at_period_end);

    let logged: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM webhook_event_logs WHERE provider = 'billing' AND external_id = 'evt_1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(logged, 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn subscription_update_keeps_owning_account(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    set_test_env();
    let account_id = seed_account(&pool).await;

    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            id, account_id, stripe_subscription_id, stripe_customer_id,
            plan, status, cancel_at_period_end
        ) VALUES ($1, $2, 'sub_live', 'cus_live', 'price_basic', 'active', FALSE)
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind(account_id)
    .execute(&pool)
    .await
    .unwrap();

    // No billing API call happens on lifecycle events.
    let billing_api = MockServer::start();
    let provider: Arc<dyn BillingProvider> =
        Arc::new(StripeClient::new(billing_api.base_url(), "sk_test"));

    let body = json!({
        "id": "evt_2",
        "type": "customer.subscription.updated",
        "data": {"object": {
            "id": "sub_live",
            "customer": "cus_live",
            "status": "past_due",
            "cancel_at_period_end": true,
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "items": {"data": [{"price": {"id": "price_pro"}}]}
        }}
    })
    .to_string();
    let signature = sign(&body);

    let status = post_event(billing_app(pool.clone(), provider), body, Some(signature)).await;
    assert_eq!(status, StatusCode::OK);

    let (owner, plan, sub_status, cancel): (i32, Option<String>, String, bool) = sqlx::query_as(
        "SELECT account_id, plan, status, cancel_at_period_end FROM subscriptions WHERE stripe_subscription_id = 'sub_live'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(owner, account_id, "account_id must survive lifecycle events");
    assert_eq!(plan.as_deref(), Some("price_pro"));
    assert_eq!(sub_status, "past_due");
    assert!(cancel);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn bad_signature_is_rejected_before_any_write(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    set_test_env();

    let billing_api = MockServer::start();
    let provider: Arc<dyn BillingProvider> =
        Arc::new(StripeClient::new(billing_api.base_url(), "sk_test"));

    let body = json!({"id": "evt_3", "type": "checkout.session.completed"}).to_string();

    let status = post_event(
        billing_app(pool.clone(), provider.clone()),
        body.clone(),
        Some("t=1700000000,v1=deadbeef".to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let status = post_event(billing_app(pool.clone(), provider), body, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let logged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_event_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(logged, 0, "unverified events must leave no trace");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unknown_event_types_are_acked_without_writes(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    set_test_env();

    let billing_api = MockServer::start();
    let provider: Arc<dyn BillingProvider> =
        Arc::new(StripeClient::new(billing_api.base_url(), "sk_test"));

    let body = json!({"id": "evt_4", "type": "invoice.finalized", "data": {"object": {}}}).to_string();
    let signature = sign(&body);

    let status = post_event(billing_app(pool.clone(), provider), body, Some(signature)).await;
    assert_eq!(status, StatusCode::OK);

    let mirrors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(mirrors, 0);
}
