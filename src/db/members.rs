use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub account_id: i32,
    pub display_name: String,
    pub phone: String,
    pub phone_digits: String,
    pub created_at: DateTime<Utc>,
}

/// Member whose normalized phone matches `phone_digits` and whose owning
/// account holds a subscription in `active`/`trialing` status, not marked for
/// cancellation, with a period end either open or after `now`. This is the
/// whole authorization question for the toll-free line; callers that get
/// `None` must be rejected.
pub async fn find_authorized<'c, E>(
    executor: E,
    phone_digits: &str,
    now: DateTime<Utc>,
) -> Result<Option<Member>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        SELECT m.id, m.account_id, m.display_name, m.phone, m.phone_digits, m.created_at
        FROM members m
        JOIN subscriptions s ON s.account_id = m.account_id
        WHERE m.phone_digits = $1
          AND s.status IN ('active', 'trialing')
          AND s.cancel_at_period_end = FALSE
          AND (s.current_period_end IS NULL OR s.current_period_end > $2)
        ORDER BY s.updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(phone_digits)
    .bind(now)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

pub async fn get<'c, E>(executor: E, member_id: i64) -> Result<Option<Member>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        "SELECT id, account_id, display_name, phone, phone_digits, created_at FROM members WHERE id = $1",
    )
    .bind(member_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|row| map_row(&row)))
}

fn map_row(row: &PgRow) -> Member {
    Member {
        id: row.get("id"),
        account_id: row.get("account_id"),
        display_name: row.get("display_name"),
        phone: row.get("phone"),
        phone_digits: row.get("phone_digits"),
        created_at: row.get("created_at"),
    }
}
