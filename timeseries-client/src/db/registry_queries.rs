use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{Asset, DataSource, NewSensor, Sensor};

/// Find or create an asset type by name. Returns its id and whether it was created.
pub async fn ensure_asset_type(pool: &PgPool, name: &str, description: &str) -> Result<(i64, bool)> {
    // The no-op update makes RETURNING yield the existing row on conflict;
    // xmax = 0 only holds for freshly inserted rows.
    let row: (i64, bool) = sqlx::query_as(
        r#"
        INSERT INTO asset_types (name, description)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, (xmax = 0) AS created
        "#,
    )
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Find or create a public asset (no owning account).
pub async fn ensure_asset(pool: &PgPool, name: &str, asset_type_id: i64) -> Result<(Asset, bool)> {
    let row: (i64, String, i64, bool) = sqlx::query_as(
        r#"
        INSERT INTO assets (name, asset_type_id, account_id)
        VALUES ($1, $2, NULL)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name, asset_type_id, (xmax = 0) AS created
        "#,
    )
    .bind(name)
    .bind(asset_type_id)
    .fetch_one(pool)
    .await?;

    let (id, name, asset_type_id, created) = row;
    Ok((
        Asset {
            id,
            name,
            asset_type_id,
        },
        created,
    ))
}

/// Find a sensor by (asset, name, unit), creating it if missing.
///
/// An existing sensor keeps its timezone and resolution.
pub async fn ensure_sensor(pool: &PgPool, asset_id: i64, new: &NewSensor<'_>) -> Result<(Sensor, bool)> {
    let row: (i64, String, String, i64, String, i32, bool) = sqlx::query_as(
        r#"
        INSERT INTO sensors (name, unit, asset_id, timezone, event_resolution_minutes)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (asset_id, name, unit) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name, unit, asset_id, timezone, event_resolution_minutes, (xmax = 0) AS created
        "#,
    )
    .bind(new.name)
    .bind(new.unit)
    .bind(asset_id)
    .bind(new.timezone)
    .bind(new.event_resolution_minutes)
    .fetch_one(pool)
    .await?;

    let (id, name, unit, asset_id, timezone, event_resolution_minutes, created) = row;
    Ok((
        Sensor {
            id,
            name,
            unit,
            asset_id,
            timezone,
            event_resolution_minutes,
        },
        created,
    ))
}

pub async fn sensor_by_id(pool: &PgPool, id: i64) -> Result<Option<Sensor>> {
    let sensor = sqlx::query_as::<_, Sensor>(
        r#"
        SELECT id, name, unit, asset_id, timezone, event_resolution_minutes
        FROM sensors
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(sensor)
}

pub async fn ensure_data_source(pool: &PgPool, name: &str, kind: &str, version: &str) -> Result<DataSource> {
    let source = sqlx::query_as::<_, DataSource>(
        r#"
        INSERT INTO data_sources (name, kind, version)
        VALUES ($1, $2, $3)
        ON CONFLICT (name, kind, version) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name, kind, version
        "#,
    )
    .bind(name)
    .bind(kind)
    .bind(version)
    .fetch_one(pool)
    .await?;

    Ok(source)
}

pub async fn data_source_by_id(pool: &PgPool, id: i64) -> Result<Option<DataSource>> {
    let source = sqlx::query_as::<_, DataSource>(
        "SELECT id, name, kind, version FROM data_sources WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(source)
}
