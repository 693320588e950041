use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use timeseries_client::db::{belief_queries, registry_queries, task_run_queries};
use timeseries_client::domain::{Asset, DataSource, NewSensor, SaveOutcome, Sensor, TimedBelief};

use crate::config::{DatabaseConfig, SinkConfig};
use crate::error::ImportError;
use crate::sinks::{storage, transmission_zone_name, BeliefStore, TRANSMISSION_ZONE_ASSET_TYPE};

pub struct PgBeliefStore {
    pool: PgPool,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PgBeliefStore {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    pub async fn connect(db: &DatabaseConfig, sink: &SinkConfig) -> Result<Self, ImportError> {
        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .connect(&db.uri)
            .await?;
        Ok(Self::new(
            pool,
            sink.batch_size,
            sink.max_retries,
            Duration::from_millis(sink.retry_backoff_ms),
        ))
    }

    async fn flush_batch(&self, sensor_id: i64, source_id: i64, batch: &[TimedBelief]) -> Result<SaveOutcome, ImportError> {
        let mut attempt: u32 = 0;
        loop {
            match belief_queries::upsert_beliefs(&self.pool, sensor_id, source_id, batch).await {
                Ok(outcome) => {
                    metrics::counter!("beliefs_saved_total").increment(outcome.inserted + outcome.updated);
                    return Ok(outcome);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        sensor_id,
                        "belief batch upsert failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, sensor_id, "belief batch upsert failed, giving up");
                    metrics::counter!("belief_store_errors_total").increment(1);
                    return Err(storage(e));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl BeliefStore for PgBeliefStore {
    async fn ensure_data_source(&self, name: &str, kind: &str, version: &str) -> Result<DataSource, ImportError> {
        registry_queries::ensure_data_source(&self.pool, name, kind, version)
            .await
            .map_err(storage)
    }

    async fn data_source_by_id(&self, id: i64) -> Result<Option<DataSource>, ImportError> {
        registry_queries::data_source_by_id(&self.pool, id).await.map_err(storage)
    }

    async fn ensure_transmission_zone(&self, country: &str) -> Result<Asset, ImportError> {
        let (asset_type_id, created) = registry_queries::ensure_asset_type(
            &self.pool,
            TRANSMISSION_ZONE_ASSET_TYPE,
            "A grid regulated & balanced as a whole, usually a national grid.",
        )
        .await
        .map_err(storage)?;
        if created {
            tracing::info!(asset_type = TRANSMISSION_ZONE_ASSET_TYPE, "created asset type");
        }

        let (asset, created) = registry_queries::ensure_asset(&self.pool, &transmission_zone_name(country), asset_type_id)
            .await
            .map_err(storage)?;
        if created {
            tracing::info!(asset = %asset.name, "created transmission zone asset");
        }
        Ok(asset)
    }

    async fn ensure_sensor(&self, asset: &Asset, new: &NewSensor<'_>) -> Result<Sensor, ImportError> {
        let (sensor, created) = registry_queries::ensure_sensor(&self.pool, asset.id, new)
            .await
            .map_err(storage)?;
        if created {
            tracing::info!(sensor = %sensor.name, unit = %sensor.unit, asset = %asset.name, "created sensor");
        }
        Ok(sensor)
    }

    async fn sensor_by_id(&self, id: i64) -> Result<Option<Sensor>, ImportError> {
        registry_queries::sensor_by_id(&self.pool, id).await.map_err(storage)
    }

    async fn save_beliefs(
        &self,
        sensor: &Sensor,
        source: &DataSource,
        beliefs: &[TimedBelief],
    ) -> Result<SaveOutcome, ImportError> {
        let mut outcome = SaveOutcome::default();
        for batch in beliefs.chunks(self.batch_size) {
            outcome.merge(self.flush_batch(sensor.id, source.id, batch).await?);
        }
        Ok(outcome)
    }

    async fn record_task_run(&self, name: &str, succeeded: bool) -> Result<(), ImportError> {
        task_run_queries::record_task_run(&self.pool, name, Utc::now(), succeeded)
            .await
            .map_err(storage)
    }
}
