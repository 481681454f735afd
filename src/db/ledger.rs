use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

pub const SOURCE_TOLLFREE: &str = "tollfree";
pub const SOURCE_AGENT: &str = "agent";

/// Append-only usage record. Rows are inserted once per completed call and
/// never updated; reporting and billing read this table, not the mutable
/// call log.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: i64,
    pub member_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i32,
    pub source: String,
    pub is_member_call: bool,
    pub created_at: DateTime<Utc>,
}

pub struct AppendLedgerEntry<'a> {
    pub member_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i32,
    pub source: &'a str,
    pub is_member_call: bool,
}

pub async fn append<'c, E>(
    executor: E,
    input: AppendLedgerEntry<'_>,
) -> Result<LedgerEntry, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO call_ledger (member_id, started_at, ended_at, duration_seconds, source, is_member_call)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, member_id, started_at, ended_at, duration_seconds, source, is_member_call, created_at
        "#,
    )
    .bind(input.member_id)
    .bind(input.started_at)
    .bind(input.ended_at)
    .bind(input.duration_seconds)
    .bind(input.source)
    .bind(input.is_member_call)
    .fetch_one(executor)
    .await?;

    Ok(map_row(&row))
}

fn map_row(row: &PgRow) -> LedgerEntry {
    LedgerEntry {
        id: row.get("id"),
        member_id: row.get("member_id"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        duration_seconds: row.get("duration_seconds"),
        source: row.get("source"),
        is_member_call: row.get("is_member_call"),
        created_at: row.get("created_at"),
    }
}
