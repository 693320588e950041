use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::domain::{SaveOutcome, TimedBelief};

/// Upsert one batch of beliefs for a sensor and source.
///
/// Rows are keyed by (sensor, event_start, source). An existing row is only
/// rewritten when its value differs, so unchanged rows are reported as such.
/// The batch must not contain the same `event_start` twice.
pub async fn upsert_beliefs(
    pool: &PgPool,
    sensor_id: i64,
    source_id: i64,
    beliefs: &[TimedBelief],
) -> Result<SaveOutcome> {
    if beliefs.is_empty() {
        return Ok(SaveOutcome::default());
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO timed_beliefs (sensor_id, source_id, event_start, belief_time, event_value) ",
    );
    builder.push_values(beliefs, |mut b, belief| {
        b.push_bind(sensor_id)
            .push_bind(source_id)
            .push_bind(belief.event_start)
            .push_bind(belief.belief_time)
            .push_bind(belief.event_value);
    });
    builder.push(
        r#"
        ON CONFLICT (sensor_id, event_start, source_id) DO UPDATE
        SET event_value = EXCLUDED.event_value,
            belief_time = EXCLUDED.belief_time
        WHERE timed_beliefs.event_value IS DISTINCT FROM EXCLUDED.event_value
        RETURNING (xmax = 0) AS inserted
        "#,
    );

    let written: Vec<bool> = builder.build_query_scalar::<bool>().fetch_all(pool).await?;
    let inserted = written.iter().filter(|inserted| **inserted).count() as u64;
    let updated = written.len() as u64 - inserted;

    Ok(SaveOutcome {
        inserted,
        updated,
        unchanged: beliefs.len() as u64 - written.len() as u64,
    })
}
