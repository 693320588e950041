//! Day-ahead generation forecast and the CO₂ intensity derived from it.

use chrono::{DateTime, TimeDelta, Utc};
use timeseries_client::domain::{DataSource, Sensor};

use crate::error::ImportError;
use crate::pipeline::{
    ensure_derived_source, ensure_entsoe_source, DayImporter, DaySummary, ImportContext, SensorSpec,
};
use crate::sources::POWER_UNIT;
use crate::transform::co2::{
    retain_with, CO2_INTENSITY_UNIT, SCHEDULED_GENERATION, SOLAR, WIND_OFFSHORE, WIND_ONSHORE,
};
use crate::transform::{co2_intensity_series, combine_mix, resample, EmissionFactors, Series};

pub const CO2_INTENSITY: &str = "CO₂ intensity";

pub const SENSORS: [SensorSpec; 5] = [
    SensorSpec {
        name: SCHEDULED_GENERATION,
        unit: POWER_UNIT,
        resolution_minutes: 15,
        by_entsoe: true,
    },
    SensorSpec {
        name: SOLAR,
        unit: POWER_UNIT,
        resolution_minutes: 60,
        by_entsoe: true,
    },
    SensorSpec {
        name: WIND_ONSHORE,
        unit: POWER_UNIT,
        resolution_minutes: 60,
        by_entsoe: true,
    },
    SensorSpec {
        name: WIND_OFFSHORE,
        unit: POWER_UNIT,
        resolution_minutes: 60,
        by_entsoe: true,
    },
    SensorSpec {
        name: CO2_INTENSITY,
        unit: CO2_INTENSITY_UNIT,
        resolution_minutes: 15,
        by_entsoe: false,
    },
];

/// Resolution at which the generation mix is combined.
const MIX_RESOLUTION_MINUTES: i64 = 15;

pub struct DayAheadGenerationImporter {
    sensors: Vec<(SensorSpec, Sensor)>,
    entsoe_source: DataSource,
    derived_source: DataSource,
    factors: EmissionFactors,
}

impl DayAheadGenerationImporter {
    pub async fn setup(
        ctx: &ImportContext<'_>,
        derived_source_name: &str,
        factors: EmissionFactors,
    ) -> Result<Self, ImportError> {
        let entsoe_source = ensure_entsoe_source(ctx.store).await?;
        let derived_source = ensure_derived_source(ctx.store, derived_source_name).await?;
        let sensors = SENSORS.into_iter().zip(ctx.ensure_sensors(&SENSORS).await?).collect();

        Ok(Self {
            sensors,
            entsoe_source,
            derived_source,
            factors,
        })
    }
}

#[async_trait::async_trait]
impl DayImporter for DayAheadGenerationImporter {
    async fn import_day(
        &self,
        ctx: &ImportContext<'_>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DaySummary, ImportError> {
        let mix_resolution = TimeDelta::minutes(MIX_RESOLUTION_MINUTES);

        tracing::info!("Getting scheduled generation ...");
        // solar and wind are not scheduled, so not part of this
        let scheduled = ctx.client.query_generation_forecast(ctx.area, start, end).await?;
        tracing::debug!(points = scheduled.len(), resolution = %scheduled.resolution, "scheduled generation");

        tracing::info!("Getting green generation ...");
        let green = ctx.client.query_wind_and_solar_forecast(ctx.area, start, end).await?;
        for label in [SOLAR, WIND_ONSHORE, WIND_OFFSHORE] {
            if !green.contains_key(label) {
                tracing::warn!(area = %ctx.area.code, "no {label} forecast, leaving it out of the mix");
            }
        }

        tracing::info!("Computing CO₂ content from the MWh values ...");
        let mut columns: Vec<(&str, Series)> = vec![(SCHEDULED_GENERATION, resample(&scheduled, mix_resolution)?)];
        for (label, series) in &green {
            columns.push((label.as_str(), resample(series, mix_resolution)?));
        }
        let mut mixes = combine_mix(columns.iter().map(|(label, series)| (*label, series)));
        let unscheduled = retain_with(&mut mixes, SCHEDULED_GENERATION);
        if unscheduled > 0 {
            tracing::warn!(unscheduled, "no scheduled generation at these timestamps, no CO₂ intensity for them");
        }
        let intensity = co2_intensity_series(&mixes, &self.factors, mix_resolution)?;
        tracing::debug!(points = intensity.len(), "CO₂ intensity");

        let mut summary = DaySummary::default();
        for (spec, sensor) in &self.sensors {
            let series = match spec.name {
                SCHEDULED_GENERATION => Some(&scheduled),
                CO2_INTENSITY => Some(&intensity),
                label => green.get(label),
            };
            let Some(series) = series else {
                continue;
            };
            if series.is_empty() {
                tracing::warn!(sensor = %sensor.name, "nothing to save");
                continue;
            }
            let source = if spec.by_entsoe {
                &self.entsoe_source
            } else {
                &self.derived_source
            };
            summary.saved.push(ctx.save_series(series, sensor, source).await?);
        }
        Ok(summary)
    }
}
