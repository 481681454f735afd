use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CallLog {
    pub id: i64,
    pub member_id: i64,
    pub phone: String,
    pub call_sid: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub status: String,
}

pub async fn open_call<'c, E>(
    executor: E,
    member_id: i64,
    phone: &str,
    call_sid: Option<&str>,
    started_at: DateTime<Utc>,
) -> Result<CallLog, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO tollfree_call_logs (member_id, phone, call_sid, started_at, status)
        VALUES ($1, $2, $3, $4, 'in_progress')
        RETURNING id, member_id, phone, call_sid, started_at, ended_at, duration_seconds, status
        "#,
    )
    .bind(member_id)
    .bind(phone)
    .bind(call_sid)
    .bind(started_at)
    .fetch_one(executor)
    .await?;

    Ok(map_row(&row))
}

/// Primary completion-handler lookup: the open row tagged with the carrier's
/// call sid.
pub async fn find_open_by_sid<'c, E>(
    executor: E,
    call_sid: &str,
) -> Result<Option<CallLog>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        SELECT id, member_id, phone, call_sid, started_at, ended_at, duration_seconds, status
        FROM tollfree_call_logs
        WHERE call_sid = $1 AND status = 'in_progress'
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .bind(call_sid)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// Fallback completion-handler lookup for calls whose sid was not captured at
/// start: the most recent open row whose phone ends with the caller's last 10
/// digits.
pub async fn find_open_by_phone_suffix<'c, E>(
    executor: E,
    last_ten: &str,
) -> Result<Option<CallLog>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    if last_ten.is_empty() {
        return Ok(None);
    }
    let row = sqlx::query(
        r#"
        SELECT id, member_id, phone, call_sid, started_at, ended_at, duration_seconds, status
        FROM tollfree_call_logs
        WHERE status = 'in_progress'
          AND RIGHT(REGEXP_REPLACE(phone, '[^0-9]', '', 'g'), 10) = $1
        ORDER BY started_at DESC
        LIMIT 1
        "#,
    )
    .bind(last_ten)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// One-shot in_progress -> terminal transition. Returns the updated row, or
/// `None` when the row was already finalized by an earlier callback.
pub async fn finalize<'c, E>(
    executor: E,
    id: i64,
    ended_at: DateTime<Utc>,
    duration_seconds: i32,
    status: &str,
) -> Result<Option<CallLog>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        UPDATE tollfree_call_logs
        SET ended_at = $2, duration_seconds = $3, status = $4
        WHERE id = $1 AND status = 'in_progress'
        RETURNING id, member_id, phone, call_sid, started_at, ended_at, duration_seconds, status
        "#,
    )
    .bind(id)
    .bind(ended_at)
    .bind(duration_seconds)
    .bind(status)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

fn map_row(row: &PgRow) -> CallLog {
    CallLog {
        id: row.get("id"),
        member_id: row.get("member_id"),
        phone: row.get("phone"),
        call_sid: row.get("call_sid"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        duration_seconds: row.get("duration_seconds"),
        status: row.get("status"),
    }
}
