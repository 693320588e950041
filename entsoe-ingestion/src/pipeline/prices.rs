use chrono::{DateTime, Utc};
use timeseries_client::domain::{DataSource, Sensor};

use crate::error::ImportError;
use crate::pipeline::{ensure_entsoe_source, DayImporter, DaySummary, ImportContext, SensorSpec};
use crate::sources::PRICE_UNIT;

pub const DAY_AHEAD_PRICES: &str = "Day-ahead prices";

pub const SENSORS: [SensorSpec; 1] = [SensorSpec {
    name: DAY_AHEAD_PRICES,
    unit: PRICE_UNIT,
    resolution_minutes: 60,
    by_entsoe: true,
}];

pub struct DayAheadPricesImporter {
    sensor: Sensor,
    source: DataSource,
}

impl DayAheadPricesImporter {
    /// Prices go to the given sensor and source when ids are passed, otherwise
    /// to "Day-ahead prices" under the ENTSO-E source.
    pub async fn setup(
        ctx: &ImportContext<'_>,
        sensor_id: Option<i64>,
        source_id: Option<i64>,
    ) -> Result<Self, ImportError> {
        let source = match source_id {
            Some(id) => ctx
                .store
                .data_source_by_id(id)
                .await?
                .ok_or_else(|| ImportError::Configuration(format!("no data source with id {id}")))?,
            None => ensure_entsoe_source(ctx.store).await?,
        };

        let sensor = match sensor_id {
            Some(id) => ctx
                .store
                .sensor_by_id(id)
                .await?
                .ok_or_else(|| ImportError::Configuration(format!("no sensor with id {id}")))?,
            None => {
                let mut sensors = ctx.ensure_sensors(&SENSORS).await?;
                sensors.pop().ok_or_else(|| {
                    ImportError::Storage(format!("sensor {DAY_AHEAD_PRICES} was not created"))
                })?
            }
        };

        if sensor.unit != PRICE_UNIT {
            tracing::warn!(sensor = %sensor.name, unit = %sensor.unit, "sensor unit differs from {PRICE_UNIT}");
        }

        Ok(Self { sensor, source })
    }
}

#[async_trait::async_trait]
impl DayImporter for DayAheadPricesImporter {
    async fn import_day(
        &self,
        ctx: &ImportContext<'_>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DaySummary, ImportError> {
        tracing::info!("Getting prices ...");
        let prices = ctx.client.query_day_ahead_prices(ctx.area, start, end).await?;
        tracing::debug!(points = prices.len(), resolution = %prices.resolution, "prices");

        let saved = ctx.save_series(&prices, &self.sensor, &self.source).await?;
        Ok(DaySummary { saved: vec![saved] })
    }
}
