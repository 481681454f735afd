use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TrialCall {
    pub phone_digits: String,
    pub first_call_at: DateTime<Utc>,
    pub call_count: i32,
}

pub async fn get<'c, E>(executor: E, phone_digits: &str) -> Result<Option<TrialCall>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        "SELECT phone_digits, first_call_at, call_count FROM trial_calls WHERE phone_digits = $1",
    )
    .bind(phone_digits)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

/// Record the caller's one and only trial call. The unique key on
/// `phone_digits` makes a concurrent double-grant resolve to a single row;
/// the conflict arm leaves the original `first_call_at` untouched.
pub async fn record_first_call<'c, E>(
    executor: E,
    phone_digits: &str,
    now: DateTime<Utc>,
) -> Result<TrialCall, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO trial_calls (phone_digits, first_call_at, call_count)
        VALUES ($1, $2, 1)
        ON CONFLICT (phone_digits)
        DO UPDATE SET call_count = trial_calls.call_count + 1
        RETURNING phone_digits, first_call_at, call_count
        "#,
    )
    .bind(phone_digits)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(map_row(&row))
}

fn map_row(row: &PgRow) -> TrialCall {
    TrialCall {
        phone_digits: row.get("phone_digits"),
        first_call_at: row.get("first_call_at"),
        call_count: row.get("call_count"),
    }
}
