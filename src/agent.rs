//! Voice-agent completion webhook. The agent platform calls this after it
//! hangs up, with a summary of the conversation; we ledger the usage and
//! send a best-effort notification email.

use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{ledger, members, webhook_events};
use crate::error::{AppError, AppResult};
use crate::notify::Mailer;
use crate::phone::normalize_digits;

#[derive(Debug, Deserialize)]
pub struct AgentCallReport {
    pub caller: String,
    pub duration_seconds: i64,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub transcript_url: Option<String>,
}

pub async fn call_completed(
    Extension(pool): Extension<PgPool>,
    Extension(mailer): Extension<Arc<Mailer>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let provided = headers
        .get("x-agent-secret")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if provided != crate::config::AGENT_WEBHOOK_SECRET.as_str() {
        return Err(AppError::Unauthorized);
    }

    // The body is parsed by hand so the shared-secret check above always runs
    // first and a malformed report comes back as our own 400 shape.
    let report: AgentCallReport = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid call report: {e}")))?;

    if report.duration_seconds < 0 {
        return Err(AppError::BadRequest("Negative call duration".into()));
    }

    let payload = json!({
        "caller": &report.caller,
        "duration_seconds": report.duration_seconds,
        "issue": &report.issue,
        "resolved": report.resolved,
        "recording_url": &report.recording_url,
        "transcript_url": &report.transcript_url,
    });
    if let Err(e) = webhook_events::record(&pool, "agent", "call.completed", None, &payload).await {
        warn!(?e, "failed to record agent webhook event");
    }

    let now = Utc::now();
    let ended_at = now;
    let started_at = report
        .started_at
        .unwrap_or(ended_at - Duration::seconds(report.duration_seconds));

    // Trial callers have no member row; the entry still lands in the ledger
    // with the member reference empty.
    let digits = normalize_digits(&report.caller);
    let member = members::find_authorized(&pool, &digits, now).await?;

    let entry = ledger::append(
        &pool,
        ledger::AppendLedgerEntry {
            member_id: member.as_ref().map(|m| m.id),
            started_at,
            ended_at,
            duration_seconds: report.duration_seconds.min(i32::MAX as i64) as i32,
            source: ledger::SOURCE_AGENT,
            is_member_call: member.is_some(),
        },
    )
    .await?;

    // Notification failures never block the ack; the agent platform would
    // just re-deliver and double-ledger the call.
    let subject = format!(
        "Support call {}: {}",
        if report.resolved { "resolved" } else { "unresolved" },
        report.issue.as_deref().unwrap_or("uncategorized"),
    );
    let body = format!(
        "Caller: {}\nDuration: {}s\nRecording: {}\nTranscript: {}",
        report.caller,
        report.duration_seconds,
        report.recording_url.as_deref().unwrap_or("-"),
        report.transcript_url.as_deref().unwrap_or("-"),
    );
    if let Err(e) = mailer.send(&subject, &body).await {
        warn!(?e, "call summary email failed");
    }

    info!(ledger_id = entry.id, member = ?entry.member_id, "agent call ledgered");
    Ok(Json(json!({ "ok": true })))
}
