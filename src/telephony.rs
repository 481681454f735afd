//! Carrier-facing webhook handlers for the toll-free and trial lines. The
//! carrier requires well-formed voice markup on every response, so these
//! handlers never surface an HTTP error: every internal failure degrades to a
//! spoken rejection (fail closed) or, for the status callback, an empty ack.

use axum::extract::Extension;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::config;
use crate::db::{call_logs, ledger, members, trial_calls};
use crate::extractor::LenientForm;
use crate::phone::{last_ten_digits, normalize_digits};
use crate::twiml::VoiceResponse;

const MEMBER_GREETING: &str = "Welcome back. Connecting you to your support agent now.";
const TRIAL_GREETING: &str =
    "Welcome to your free trial call. Connecting you to a support agent now.";
const NOT_A_MEMBER: &str = "This number is not registered with a membership. \
     Please sign up on our website to get support.";
const TRIAL_EXHAUSTED: &str = "You have already used your free trial call. \
     Please sign up on our website for unlimited support.";
const HIGH_TRAFFIC: &str =
    "We are experiencing high call volume right now. Please try again in a few minutes.";
const WRONG_LINE: &str = "You have reached this number in error. Goodbye.";
const APOLOGY: &str = "We are sorry, something went wrong on our end. Please try again later.";

#[derive(Debug, Default, Deserialize)]
pub struct InboundCallForm {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallStatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

/// Inbound-call classifier for the member toll-free line.
pub async fn inbound_call(
    Extension(pool): Extension<PgPool>,
    LenientForm(form): LenientForm<InboundCallForm>,
) -> VoiceResponse {
    let (Some(from), Some(to)) = (form.from.as_deref(), form.to.as_deref()) else {
        warn!("inbound call missing From/To");
        return VoiceResponse::new().say(APOLOGY);
    };

    // Calls routed here for any other number are a carrier misconfiguration;
    // reject before touching the store.
    if normalize_digits(to) != normalize_digits(config::TOLLFREE_NUMBER.as_str()) {
        warn!(%to, "call dialed to unexpected number");
        return VoiceResponse::new().say(WRONG_LINE);
    }

    let digits = normalize_digits(from);
    let now = Utc::now();
    let member = match members::find_authorized(&pool, &digits, now).await {
        Ok(member) => member,
        Err(e) => {
            // Fail closed: a lookup error must never bridge an unverified
            // caller to the paid agent line.
            error!(?e, "member lookup failed");
            return VoiceResponse::new().say(APOLOGY);
        }
    };

    let Some(member) = member else {
        info!(%digits, "unauthorized caller rejected");
        return VoiceResponse::new().say(NOT_A_MEMBER);
    };

    if let Err(e) =
        call_logs::open_call(&pool, member.id, from, form.call_sid.as_deref(), now).await
    {
        error!(?e, member_id = member.id, "failed to open call log");
        return VoiceResponse::new().say(APOLOGY);
    }

    info!(member_id = member.id, "member call connected");
    VoiceResponse::new().say(MEMBER_GREETING).dial(
        config::AGENT_NUMBER.as_str(),
        *config::MEMBER_CALL_LIMIT_SECS,
    )
}

/// Trial-call gate for the public marketing line: exactly one free call per
/// phone number, ever.
pub async fn trial_call(
    Extension(pool): Extension<PgPool>,
    LenientForm(form): LenientForm<InboundCallForm>,
) -> VoiceResponse {
    let Some(from) = form.from.as_deref() else {
        warn!("trial call missing From");
        return VoiceResponse::new().say(APOLOGY);
    };

    let digits = last_ten_digits(from);
    if digits.is_empty() {
        return VoiceResponse::new().say(APOLOGY);
    }

    let existing = match trial_calls::get(&pool, &digits).await {
        Ok(existing) => existing,
        Err(e) => {
            // Distinct from the exhausted message so a store outage never
            // reads as "grant everyone a fresh trial".
            error!(?e, "trial lookup failed");
            return VoiceResponse::new().say(HIGH_TRAFFIC);
        }
    };

    if existing.is_some() {
        info!(%digits, "trial caller already used their call");
        return VoiceResponse::new().say(TRIAL_EXHAUSTED);
    }

    let now = Utc::now();
    if let Err(e) = trial_calls::record_first_call(&pool, &digits, now).await {
        error!(?e, "failed to record trial call");
        return VoiceResponse::new().say(HIGH_TRAFFIC);
    }

    info!(%digits, "trial call granted");
    VoiceResponse::new()
        .say(TRIAL_GREETING)
        .dial(config::AGENT_NUMBER.as_str(), *config::TRIAL_CALL_LIMIT_SECS)
}

/// End-of-call status callback. Always answers an empty ack document; the
/// carrier retries on anything else and there is nothing it could do with an
/// error anyway.
pub async fn call_status(
    Extension(pool): Extension<PgPool>,
    LenientForm(form): LenientForm<CallStatusForm>,
) -> VoiceResponse {
    let now = Utc::now();
    if let Err(e) = record_completion(&pool, &form, now).await {
        error!(?e, call_sid = ?form.call_sid, "call completion handling failed");
    }
    VoiceResponse::new()
}

/// Locate and finalize the open call-log row, then append the ledger entry.
/// Missing rows are a success: the callback may arrive for calls this service
/// never connected, or arrive twice.
async fn record_completion(
    pool: &PgPool,
    form: &CallStatusForm,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let Some(log) = locate_open_log(pool, form).await? else {
        info!(call_sid = ?form.call_sid, "no open call log for completion; ignoring");
        return Ok(());
    };

    let duration = (now - log.started_at).num_seconds().max(0) as i32;
    let status = terminal_status(form.call_status.as_deref().unwrap_or("completed"));

    let Some(updated) = call_logs::finalize(pool, log.id, now, duration, status).await? else {
        // Lost a race with another delivery of the same callback.
        info!(log_id = log.id, "call log already finalized");
        return Ok(());
    };

    ledger::append(
        pool,
        ledger::AppendLedgerEntry {
            member_id: Some(updated.member_id),
            started_at: updated.started_at,
            ended_at: now,
            duration_seconds: duration,
            source: ledger::SOURCE_TOLLFREE,
            is_member_call: true,
        },
    )
    .await?;

    info!(log_id = updated.id, duration, status, "call finalized");
    Ok(())
}

/// Ordered lookup chain for the completion handler: the sid-tagged open row
/// first, then the newest open row for the caller's last-10 digits (covers
/// calls whose sid was not captured at start). Each strategy reports "not
/// found" rather than erroring so the resolver can move on.
async fn locate_open_log(
    pool: &PgPool,
    form: &CallStatusForm,
) -> Result<Option<call_logs::CallLog>, sqlx::Error> {
    if let Some(sid) = form.call_sid.as_deref().filter(|sid| !sid.is_empty()) {
        if let Some(log) = call_logs::find_open_by_sid(pool, sid).await? {
            return Ok(Some(log));
        }
    }
    if let Some(from) = form.from.as_deref() {
        let suffix = last_ten_digits(from);
        if let Some(log) = call_logs::find_open_by_phone_suffix(pool, &suffix).await? {
            return Ok(Some(log));
        }
    }
    Ok(None)
}

/// Map the carrier's terminal status onto the call-log status. Unrecognized
/// values count as completed.
fn terminal_status(provider_status: &str) -> &'static str {
    match provider_status {
        "busy" | "failed" | "no-answer" | "canceled" => call_logs::STATUS_FAILED,
        _ => call_logs::STATUS_COMPLETED,
    }
}

#[cfg(test)]
mod tests {
    use super::terminal_status;
    use crate::db::call_logs::{STATUS_COMPLETED, STATUS_FAILED};

    #[test]
    fn failure_statuses_map_to_failed() {
        for status in ["busy", "failed", "no-answer", "canceled"] {
            assert_eq!(terminal_status(status), STATUS_FAILED, "{status}");
        }
    }

    #[test]
    fn completed_and_unknown_map_to_completed() {
        assert_eq!(terminal_status("completed"), STATUS_COMPLETED);
        assert_eq!(terminal_status("weird-new-status"), STATUS_COMPLETED);
        assert_eq!(terminal_status(""), STATUS_COMPLETED);
    }
}
