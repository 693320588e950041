//! Realised generation per production type and the CO₂ intensity of that mix.

use chrono::{DateTime, Utc};
use timeseries_client::domain::{DataSource, Sensor};

use crate::error::ImportError;
use crate::pipeline::{ensure_derived_source, DayImporter, DaySummary, ImportContext, SensorSpec};
use crate::transform::co2::CO2_INTENSITY_UNIT;
use crate::transform::{co2_intensity_series, combine_mix, resample, EmissionFactors};

pub const ACTUAL_CO2_INTENSITY: &str = "CO₂ intensity (actual)";

pub const SENSORS: [SensorSpec; 1] = [SensorSpec {
    name: ACTUAL_CO2_INTENSITY,
    unit: CO2_INTENSITY_UNIT,
    resolution_minutes: 60,
    by_entsoe: false,
}];

pub struct ActualGenerationImporter {
    sensor: Sensor,
    source: DataSource,
    factors: EmissionFactors,
}

impl ActualGenerationImporter {
    pub async fn setup(
        ctx: &ImportContext<'_>,
        derived_source_name: &str,
        factors: EmissionFactors,
    ) -> Result<Self, ImportError> {
        let source = ensure_derived_source(ctx.store, derived_source_name).await?;
        let sensor = ctx
            .ensure_sensors(&SENSORS)
            .await?
            .pop()
            .ok_or_else(|| ImportError::Storage(format!("sensor {ACTUAL_CO2_INTENSITY} was not created")))?;

        Ok(Self { sensor, source, factors })
    }
}

#[async_trait::async_trait]
impl DayImporter for ActualGenerationImporter {
    async fn import_day(
        &self,
        ctx: &ImportContext<'_>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DaySummary, ImportError> {
        tracing::info!("Getting actual generation per production type ...");
        let per_type = ctx.client.query_generation_per_type(ctx.area, start, end).await?;

        let unknown: Vec<&str> = per_type
            .keys()
            .map(String::as_str)
            .filter(|tech| self.factors.get(tech).is_none())
            .collect();
        if !unknown.is_empty() {
            tracing::warn!(?unknown, "production types without emission factor are left out");
        }

        // mixed resolutions (e.g. 15 min and hourly types) are combined at the sensor's
        let resolution = self.sensor.event_resolution();
        let mut columns = Vec::with_capacity(per_type.len());
        for (tech, series) in &per_type {
            columns.push((tech.as_str(), resample(series, resolution)?));
        }
        let mixes = combine_mix(columns.iter().map(|(tech, series)| (*tech, series)));
        let intensity = co2_intensity_series(&mixes, &self.factors, resolution)?;
        if intensity.is_empty() {
            return Err(ImportError::Computation(
                "no timestamp with positive generation of known production types".to_string(),
            ));
        }

        let saved = ctx.save_series(&intensity, &self.sensor, &self.source).await?;
        Ok(DaySummary { saved: vec![saved] })
    }
}
