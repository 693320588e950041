use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use timeseries_client::domain::{Asset, DataSource, NewSensor, SaveOutcome, Sensor, TimedBelief};
use tokio::sync::Mutex;

use crate::error::ImportError;
use crate::sinks::{transmission_zone_name, BeliefStore, TRANSMISSION_ZONE_ASSET_TYPE};

/// In-process store with the same upsert semantics as [`super::PgBeliefStore`].
#[derive(Default)]
pub struct MemoryBeliefStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    asset_types: Vec<String>,
    assets: Vec<Asset>,
    sensors: Vec<Sensor>,
    sources: Vec<DataSource>,
    /// Keyed by (sensor id, source id, event start).
    beliefs: BTreeMap<(i64, i64, DateTime<Utc>), TimedBelief>,
    task_runs: BTreeMap<String, (DateTime<Utc>, bool)>,
}

impl MemoryBeliefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored beliefs of a sensor, ordered by source and event start.
    pub async fn beliefs(&self, sensor_id: i64) -> Vec<TimedBelief> {
        let state = self.state.lock().await;
        state
            .beliefs
            .iter()
            .filter(|((sensor, _, _), _)| *sensor == sensor_id)
            .map(|(_, belief)| *belief)
            .collect()
    }

    pub async fn sensor_named(&self, name: &str) -> Option<Sensor> {
        self.state
            .lock()
            .await
            .sensors
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    /// Whether the last run of a task succeeded.
    pub async fn task_run(&self, name: &str) -> Option<bool> {
        self.state.lock().await.task_runs.get(name).map(|(_, ok)| *ok)
    }
}

#[async_trait::async_trait]
impl BeliefStore for MemoryBeliefStore {
    async fn ensure_data_source(&self, name: &str, kind: &str, version: &str) -> Result<DataSource, ImportError> {
        let mut state = self.state.lock().await;
        if let Some(source) = state
            .sources
            .iter()
            .find(|s| s.name == name && s.kind == kind && s.version == version)
        {
            return Ok(source.clone());
        }
        let source = DataSource {
            id: state.sources.len() as i64 + 1,
            name: name.to_string(),
            kind: kind.to_string(),
            version: version.to_string(),
        };
        state.sources.push(source.clone());
        Ok(source)
    }

    async fn data_source_by_id(&self, id: i64) -> Result<Option<DataSource>, ImportError> {
        Ok(self.state.lock().await.sources.iter().find(|s| s.id == id).cloned())
    }

    async fn ensure_transmission_zone(&self, country: &str) -> Result<Asset, ImportError> {
        let mut state = self.state.lock().await;
        let asset_type_id = match state
            .asset_types
            .iter()
            .position(|t| t == TRANSMISSION_ZONE_ASSET_TYPE)
        {
            Some(idx) => idx as i64 + 1,
            None => {
                state.asset_types.push(TRANSMISSION_ZONE_ASSET_TYPE.to_string());
                state.asset_types.len() as i64
            }
        };

        let name = transmission_zone_name(country);
        if let Some(asset) = state.assets.iter().find(|a| a.name == name) {
            return Ok(asset.clone());
        }
        let asset = Asset {
            id: state.assets.len() as i64 + 1,
            name,
            asset_type_id,
        };
        state.assets.push(asset.clone());
        Ok(asset)
    }

    async fn ensure_sensor(&self, asset: &Asset, new: &NewSensor<'_>) -> Result<Sensor, ImportError> {
        let mut state = self.state.lock().await;
        if let Some(sensor) = state
            .sensors
            .iter()
            .find(|s| s.asset_id == asset.id && s.name == new.name && s.unit == new.unit)
        {
            return Ok(sensor.clone());
        }
        let sensor = Sensor {
            id: state.sensors.len() as i64 + 1,
            name: new.name.to_string(),
            unit: new.unit.to_string(),
            asset_id: asset.id,
            timezone: new.timezone.to_string(),
            event_resolution_minutes: new.event_resolution_minutes,
        };
        state.sensors.push(sensor.clone());
        Ok(sensor)
    }

    async fn sensor_by_id(&self, id: i64) -> Result<Option<Sensor>, ImportError> {
        Ok(self.state.lock().await.sensors.iter().find(|s| s.id == id).cloned())
    }

    async fn save_beliefs(
        &self,
        sensor: &Sensor,
        source: &DataSource,
        beliefs: &[TimedBelief],
    ) -> Result<SaveOutcome, ImportError> {
        let mut state = self.state.lock().await;
        let mut outcome = SaveOutcome::default();
        for belief in beliefs {
            let key = (sensor.id, source.id, belief.event_start);
            match state.beliefs.get_mut(&key) {
                // only a changed value rewrites the row
                Some(existing) if existing.event_value == belief.event_value => outcome.unchanged += 1,
                Some(existing) => {
                    *existing = *belief;
                    outcome.updated += 1;
                }
                None => {
                    state.beliefs.insert(key, *belief);
                    outcome.inserted += 1;
                }
            }
        }
        metrics::counter!("beliefs_saved_total").increment(outcome.inserted + outcome.updated);
        Ok(outcome)
    }

    async fn record_task_run(&self, name: &str, succeeded: bool) -> Result<(), ImportError> {
        self.state
            .lock()
            .await
            .task_runs
            .insert(name.to_string(), (Utc::now(), succeeded));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn new_sensor() -> NewSensor<'static> {
        NewSensor {
            name: "Day-ahead prices",
            unit: "EUR/MWh",
            timezone: "Europe/Amsterdam",
            event_resolution_minutes: 60,
        }
    }

    #[tokio::test]
    async fn registry_lookups_are_idempotent() {
        let store = MemoryBeliefStore::new();
        let zone = store.ensure_transmission_zone("NL").await.unwrap();
        assert_eq!(zone.name, "NL transmission zone");
        assert_eq!(store.ensure_transmission_zone("NL").await.unwrap(), zone);

        let sensor = store.ensure_sensor(&zone, &new_sensor()).await.unwrap();
        assert_eq!(store.ensure_sensor(&zone, &new_sensor()).await.unwrap(), sensor);
        assert_eq!(store.sensor_by_id(sensor.id).await.unwrap(), Some(sensor));

        let source = store.ensure_data_source("ENTSO-E", "forecasting script", "").await.unwrap();
        let again = store.ensure_data_source("ENTSO-E", "forecasting script", "").await.unwrap();
        assert_eq!(source, again);
        assert_eq!(store.data_source_by_id(source.id).await.unwrap(), Some(source));
        assert_eq!(store.data_source_by_id(99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn saving_twice_overwrites_instead_of_duplicating() {
        let store = MemoryBeliefStore::new();
        let zone = store.ensure_transmission_zone("NL").await.unwrap();
        let sensor = store.ensure_sensor(&zone, &new_sensor()).await.unwrap();
        let source = store.ensure_data_source("ENTSO-E", "forecasting script", "").await.unwrap();

        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let belief = |offset: i64, value: f64| TimedBelief {
            event_start: t0 + TimeDelta::hours(offset),
            belief_time: t0 - TimeDelta::hours(6),
            event_value: value,
        };

        let first = store
            .save_beliefs(&sensor, &source, &[belief(0, 10.0), belief(1, 11.0)])
            .await
            .unwrap();
        assert_eq!(first, SaveOutcome { inserted: 2, updated: 0, unchanged: 0 });

        let second = store
            .save_beliefs(&sensor, &source, &[belief(0, 10.0), belief(1, 12.0)])
            .await
            .unwrap();
        assert_eq!(second, SaveOutcome { inserted: 0, updated: 1, unchanged: 1 });

        let stored = store.beliefs(sensor.id).await;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].event_value, 12.0);
    }

    #[tokio::test]
    async fn records_latest_task_run() {
        let store = MemoryBeliefStore::new();
        store.record_task_run("entsoe-import-day-ahead-prices", false).await.unwrap();
        store.record_task_run("entsoe-import-day-ahead-prices", true).await.unwrap();
        assert_eq!(store.task_run("entsoe-import-day-ahead-prices").await, Some(true));
        assert_eq!(store.task_run("other").await, None);
    }
}
