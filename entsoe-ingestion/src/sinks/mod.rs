pub mod memory;
pub mod postgres;

pub use memory::MemoryBeliefStore;
pub use postgres::PgBeliefStore;

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use timeseries_client::domain::{Asset, DataSource, NewSensor, SaveOutcome, Sensor, TimedBelief};

use crate::error::ImportError;
use crate::transform::Series;

pub const TRANSMISSION_ZONE_ASSET_TYPE: &str = "transmission zone";

/// Asset that holds all sensors of one country.
pub fn transmission_zone_name(country: &str) -> String {
    format!("{country} transmission zone")
}

/// Where sensors, sources and beliefs are kept.
#[async_trait::async_trait]
pub trait BeliefStore: Send + Sync {
    async fn ensure_data_source(&self, name: &str, kind: &str, version: &str) -> Result<DataSource, ImportError>;

    async fn data_source_by_id(&self, id: i64) -> Result<Option<DataSource>, ImportError>;

    /// Find or create the public "{country} transmission zone" asset.
    async fn ensure_transmission_zone(&self, country: &str) -> Result<Asset, ImportError>;

    /// Find a sensor by name and unit on `asset`, or create it.
    async fn ensure_sensor(&self, asset: &Asset, new: &NewSensor<'_>) -> Result<Sensor, ImportError>;

    async fn sensor_by_id(&self, id: i64) -> Result<Option<Sensor>, ImportError>;

    /// Store beliefs; an existing belief for the same event and source is overwritten.
    async fn save_beliefs(
        &self,
        sensor: &Sensor,
        source: &DataSource,
        beliefs: &[TimedBelief],
    ) -> Result<SaveOutcome, ImportError>;

    async fn record_task_run(&self, name: &str, succeeded: bool) -> Result<(), ImportError>;
}

/// Beliefs for every point of `series`.
///
/// Day-ahead data is published by D-1 18:00 local time, so the belief time of
/// an event is its local day start minus 6 hours, but never later than `now`.
pub fn beliefs_from_series(series: &Series, tz: Tz, now: DateTime<Utc>) -> Vec<TimedBelief> {
    series
        .points()
        .map(|(event_start, event_value)| TimedBelief {
            event_start,
            belief_time: belief_time(event_start, tz).min(now),
            event_value,
        })
        .collect()
}

fn belief_time(event_start: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local_date = event_start.with_timezone(&tz).date_naive();
    let day_start = local_date
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        // no local midnight on this date; fall back to the UTC day
        .unwrap_or_else(|| event_start.date_naive().and_time(NaiveTime::MIN).and_utc());
    day_start - TimeDelta::hours(6)
}

fn storage(e: anyhow::Error) -> ImportError {
    ImportError::Storage(format!("{e:#}"))
}
