//! Usage aggregation for the member dashboard: minutes and calls consumed by
//! an account's members inside a time window.

use axum::extract::{Extension, Query};
use axum::Json;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;

use crate::billing::BillingService;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthAccount;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UsageSummary {
    pub minutes_used: i64,
    pub calls_used: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// `GET /api/usage` — window defaults to the account's current billing
/// period, else the current UTC calendar month.
pub async fn get_usage(
    Extension(pool): Extension<PgPool>,
    account: AuthAccount,
    Query(query): Query<UsageQuery>,
) -> AppResult<Json<UsageSummary>> {
    let now = Utc::now();
    let (window_start, window_end) = match (query.from, query.to) {
        (Some(from), Some(to)) if from < to => (from, to),
        (None, None) => default_window(&pool, account.account_id, now).await?,
        _ => return Err(AppError::BadRequest("Invalid usage window".into())),
    };

    let minutes_used = minutes_used(&pool, account.account_id, window_start, window_end).await?;
    let calls_used = calls_used(&pool, account.account_id, window_start, window_end).await?;

    Ok(Json(UsageSummary {
        minutes_used,
        calls_used,
        window_start,
        window_end,
    }))
}

/// Minutes consumed in the window, resolved through an ordered strategy
/// chain: the precomputed Postgres aggregate first, then a raw sum over
/// ledger rows. Each strategy reports "no answer" instead of erroring; the
/// first answer wins. Only when every strategy comes back empty is the raw
/// sum's error surfaced.
pub async fn minutes_used(
    pool: &PgPool,
    account_id: i32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> AppResult<i64> {
    if let Some(minutes) = aggregated_minutes(pool, account_id, window_start, window_end).await {
        return Ok(minutes);
    }
    let seconds = raw_ledger_seconds(pool, account_id, window_start, window_end).await?;
    Ok(round_seconds_to_minutes(seconds))
}

/// First strategy: the `tollfree_minutes_used` database function. A missing
/// function, a query error, or a NULL result all mean "no answer here".
async fn aggregated_minutes(
    pool: &PgPool,
    account_id: i32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Option<i64> {
    let result = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT tollfree_minutes_used($1, $2, $3)",
    )
    .bind(account_id)
    .bind(window_start)
    .bind(window_end)
    .fetch_one(pool)
    .await;

    match result {
        Ok(Some(minutes)) => Some(round_minutes(minutes)),
        Ok(None) => None,
        Err(e) => {
            warn!(?e, "aggregate minutes function unavailable; falling back to raw sum");
            None
        }
    }
}

/// Second strategy: sum ledger durations for the account's members directly.
async fn raw_ledger_seconds(
    pool: &PgPool,
    account_id: i32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> AppResult<i64> {
    let seconds = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(l.duration_seconds), 0)::BIGINT
        FROM call_ledger l
        JOIN members m ON m.id = l.member_id
        WHERE m.account_id = $1
          AND l.started_at >= $2
          AND l.started_at < $3
        "#,
    )
    .bind(account_id)
    .bind(window_start)
    .bind(window_end)
    .fetch_one(pool)
    .await?;
    Ok(seconds)
}

pub async fn calls_used(
    pool: &PgPool,
    account_id: i32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM call_ledger l
        JOIN members m ON m.id = l.member_id
        WHERE m.account_id = $1
          AND l.started_at >= $2
          AND l.started_at < $3
        "#,
    )
    .bind(account_id)
    .bind(window_start)
    .bind(window_end)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

async fn default_window(
    pool: &PgPool,
    account_id: i32,
    now: DateTime<Utc>,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let service = BillingService::new(pool.clone());
    let mirror = service
        .mirror_for_account(account_id)
        .await
        .map_err(|e| AppError::Message(format!("subscription lookup failed: {e}")))?;

    if let Some(mirror) = mirror {
        if let (Some(start), Some(end)) = (mirror.current_period_start, mirror.current_period_end) {
            if start < end {
                return Ok((start, end));
            }
        }
    }
    Ok(calendar_month(now))
}

fn calendar_month(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month is a valid timestamp");
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("first of month is a valid timestamp");
    (start, end)
}

/// Round half-up to whole minutes, floored at zero.
fn round_minutes(minutes: f64) -> i64 {
    if !minutes.is_finite() || minutes <= 0.0 {
        return 0;
    }
    (minutes + 0.5).floor() as i64
}

fn round_seconds_to_minutes(seconds: i64) -> i64 {
    (seconds.max(0) + 30) / 60
}
