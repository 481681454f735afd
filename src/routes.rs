use axum::{
    routing::{get, post},
    Router,
};

use crate::{agent, telephony, usage, webhooks};

pub fn api_routes() -> Router {
    Router::new()
        .route("/webhooks/voice/inbound", post(telephony::inbound_call))
        .route("/webhooks/voice/trial", post(telephony::trial_call))
        .route("/webhooks/voice/status", post(telephony::call_status))
        .route("/webhooks/billing", post(webhooks::billing_webhook))
        .route("/webhooks/agent/call-completed", post(agent::call_completed))
        .route("/api/usage", get(usage::get_usage))
}
