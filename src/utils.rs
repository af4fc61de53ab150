use chrono::{DateTime, FixedOffset, NaiveDateTime};
use sqlx::SqlitePool;

pub(crate) async fn is_table_exists(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<bool, sqlx::Error> {
    Ok(
        sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?
            .is_some(),
    )
}

pub(crate) fn get_now() -> DateTime<FixedOffset> {
    let now = chrono::offset::Local::now();
    now.with_timezone(now.offset())
}

/// Default wall clock for decision-date inference. Tests swap this out
/// for a fixed value.
pub fn now_local() -> NaiveDateTime {
    chrono::offset::Local::now().naive_local()
}
