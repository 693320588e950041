use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Record the outcome of the latest run of a named task.
pub async fn record_task_run(pool: &PgPool, name: &str, at: DateTime<Utc>, succeeded: bool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO latest_task_runs (name, datetime, status)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE
        SET datetime = EXCLUDED.datetime,
            status = EXCLUDED.status
        "#,
    )
    .bind(name)
    .bind(at)
    .bind(succeeded)
    .execute(pool)
    .await?;

    Ok(())
}
