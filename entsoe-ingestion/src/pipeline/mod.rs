//! Import commands: resolve settings, then fetch, transform and store one
//! local day at a time.

pub mod actual_generation;
pub mod dates;
pub mod generation;
pub mod prices;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use timeseries_client::domain::{DataSource, NewSensor, SaveOutcome, Sensor};

use crate::config::{AppConfig, DEFAULT_COUNTRY_CODE};
use crate::error::ImportError;
use crate::sinks::{beliefs_from_series, BeliefStore};
use crate::sources::{EntsoeClient, MarketArea};
use crate::transform::{self, EmissionFactors, Series};

pub use dates::{DateRange, DefaultDates, RelativeDay};

/// Name of the source tagged on data as delivered by ENTSO-E.
pub const ENTSOE_SOURCE_NAME: &str = "ENTSO-E";
pub const SOURCE_KIND: &str = "forecasting script";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    DayAheadGeneration,
    DayAheadPrices,
    ActualGeneration,
}

impl ImportKind {
    /// Name under which the last run is recorded.
    pub fn task_name(self) -> &'static str {
        match self {
            Self::DayAheadGeneration => "entsoe-import-day-ahead-generation",
            Self::DayAheadPrices => "entsoe-import-day-ahead-prices",
            Self::ActualGeneration => "entsoe-import-actual-generation",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::DayAheadGeneration => "day-ahead generation",
            Self::DayAheadPrices => "day-ahead price",
            Self::ActualGeneration => "actual generation",
        }
    }

    fn default_dates(self) -> DefaultDates {
        match self {
            Self::DayAheadGeneration | Self::DayAheadPrices => DefaultDates::TodayAndTomorrow,
            Self::ActualGeneration => DefaultDates::Yesterday,
        }
    }
}

/// Options of one import command.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub day: Option<RelativeDay>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub dryrun: bool,
    /// Existing sensor to store prices into.
    pub sensor_id: Option<i64>,
    /// Existing source to tag prices with.
    pub source_id: Option<i64>,
}

/// Sensor created on the transmission zone when missing.
#[derive(Debug, Clone, Copy)]
pub struct SensorSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub resolution_minutes: i32,
    /// false for data computed here rather than delivered by ENTSO-E
    pub by_entsoe: bool,
}

/// Everything a day import needs.
pub struct ImportContext<'a> {
    pub client: &'a EntsoeClient,
    pub store: &'a dyn BeliefStore,
    pub area: &'a MarketArea,
    pub now: DateTime<Utc>,
    pub dryrun: bool,
}

impl ImportContext<'_> {
    pub async fn ensure_sensors(&self, specs: &[SensorSpec]) -> Result<Vec<Sensor>, ImportError> {
        let zone = self.store.ensure_transmission_zone(&self.area.code).await?;
        let mut sensors = Vec::with_capacity(specs.len());
        for spec in specs {
            let new = NewSensor {
                name: spec.name,
                unit: spec.unit,
                timezone: self.area.timezone.name(),
                event_resolution_minutes: spec.resolution_minutes,
            };
            sensors.push(self.store.ensure_sensor(&zone, &new).await?);
        }
        Ok(sensors)
    }

    /// Validate, resample to the sensor's resolution and store `series`.
    pub async fn save_series(
        &self,
        series: &Series,
        sensor: &Sensor,
        source: &DataSource,
    ) -> Result<SavedSeries, ImportError> {
        transform::validate_series(&sensor.name, series)?;
        let series = transform::resample(series, sensor.event_resolution())?;
        let beliefs = beliefs_from_series(&series, self.area.timezone, self.now);

        if self.dryrun {
            tracing::info!(sensor = %sensor.name, beliefs = beliefs.len(), "dry run, not saving beliefs");
            return Ok(SavedSeries {
                sensor: sensor.name.clone(),
                beliefs: beliefs.len(),
                outcome: None,
            });
        }

        tracing::info!("Saving {} beliefs for Sensor {} ...", beliefs.len(), sensor.name);
        let outcome = self.store.save_beliefs(sensor, source, &beliefs).await?;
        if outcome.nothing_new() {
            tracing::info!("Done. These beliefs had already been saved before.");
        } else if outcome.unchanged > 0 {
            tracing::info!("Done. Some beliefs had already been saved before.");
        }
        Ok(SavedSeries {
            sensor: sensor.name.clone(),
            beliefs: beliefs.len(),
            outcome: Some(outcome),
        })
    }
}

/// Imports the data of one local day.
#[async_trait::async_trait]
pub trait DayImporter: Send + Sync {
    async fn import_day(
        &self,
        ctx: &ImportContext<'_>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DaySummary, ImportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSeries {
    pub sensor: String,
    pub beliefs: usize,
    /// `None` in a dry run.
    pub outcome: Option<SaveOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySummary {
    pub saved: Vec<SavedSeries>,
}

#[derive(Debug)]
pub struct DayOutcome {
    pub day: NaiveDate,
    pub result: Result<DaySummary, ImportError>,
}

#[derive(Debug)]
pub struct ImportReport {
    pub kind: ImportKind,
    pub area: String,
    pub days: Vec<DayOutcome>,
}

impl ImportReport {
    pub fn failed_days(&self) -> usize {
        self.days.iter().filter(|d| d.result.is_err()).count()
    }

    pub fn succeeded(&self) -> bool {
        self.failed_days() == 0
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} import for {}:", self.kind.label(), self.area)?;
        for day in &self.days {
            match &day.result {
                Ok(summary) => {
                    let parts: Vec<String> = summary
                        .saved
                        .iter()
                        .map(|s| match s.outcome {
                            Some(o) => format!(
                                "{} {} ({} new, {} updated, {} unchanged)",
                                s.sensor, s.beliefs, o.inserted, o.updated, o.unchanged
                            ),
                            None => format!("{} {} (dry run)", s.sensor, s.beliefs),
                        })
                        .collect();
                    writeln!(f, "  {} ok: {}", day.day, parts.join(", "))?;
                }
                Err(e) => writeln!(f, "  {} FAILED: {e}", day.day)?,
            }
        }
        write!(f, "{} of {} days failed", self.failed_days(), self.days.len())
    }
}

/// A command with all settings resolved, ready to run against a store.
pub struct ImportSession {
    kind: ImportKind,
    area: MarketArea,
    dates: DateRange,
    client: EntsoeClient,
    now: DateTime<Utc>,
    dryrun: bool,
    sensor_id: Option<i64>,
    source_id: Option<i64>,
    derived_source_name: String,
    co2_overrides: BTreeMap<String, f64>,
}

impl ImportSession {
    /// Resolve area, token and dates. Does no I/O, so configuration errors
    /// surface before anything is contacted.
    pub fn prepare(
        kind: ImportKind,
        config: &AppConfig,
        request: &ImportRequest,
        now: DateTime<Utc>,
    ) -> Result<Self, ImportError> {
        let country = request
            .country
            .as_deref()
            .or(config.entsoe.country_code.as_deref())
            .unwrap_or(DEFAULT_COUNTRY_CODE);
        let timezone = request.timezone.as_deref().or(config.entsoe.country_timezone.as_deref());
        let area = MarketArea::resolve(country, timezone)?;

        let server = config.entsoe.server()?;
        let client = EntsoeClient::new(server, &config.entsoe)?;

        let today = dates::local_today(area.timezone, now);
        let dates = dates::resolve_dates(request.from_date, request.to_date, request.day, kind.default_dates(), today)?;

        Ok(Self {
            kind,
            area,
            dates,
            client,
            now,
            dryrun: request.dryrun,
            sensor_id: request.sensor_id,
            source_id: request.source_id,
            derived_source_name: config.entsoe.derived_data_source_name().to_string(),
            co2_overrides: config.co2.factors.clone(),
        })
    }

    pub fn area(&self) -> &MarketArea {
        &self.area
    }

    pub fn dates(&self) -> DateRange {
        self.dates
    }

    /// Run the import and record the task's status in the store.
    pub async fn run(&self, store: &dyn BeliefStore) -> Result<ImportReport, ImportError> {
        let result = self.run_days(store).await;
        let succeeded = matches!(&result, Ok(report) if report.succeeded());
        if let Err(e) = store.record_task_run(self.kind.task_name(), succeeded).await {
            tracing::warn!(error = %e, task = self.kind.task_name(), "failed to record task run");
        }
        result
    }

    async fn run_days(&self, store: &dyn BeliefStore) -> Result<ImportReport, ImportError> {
        let ctx = ImportContext {
            client: &self.client,
            store,
            area: &self.area,
            now: self.now,
            dryrun: self.dryrun,
        };

        tracing::info!(
            "Importing {} data for {} (timezone {}), from {} up until {}, from ENTSO-E at {} ...",
            self.kind.label(),
            self.area.code,
            self.area.timezone,
            self.dates.from,
            self.dates.to,
            self.client.url()
        );

        let importer: Box<dyn DayImporter> = match self.kind {
            ImportKind::DayAheadGeneration => Box::new(
                generation::DayAheadGenerationImporter::setup(
                    &ctx,
                    &self.derived_source_name,
                    EmissionFactors::day_ahead_forecast().with_overrides(&self.co2_overrides),
                )
                .await?,
            ),
            ImportKind::DayAheadPrices => {
                Box::new(prices::DayAheadPricesImporter::setup(&ctx, self.sensor_id, self.source_id).await?)
            }
            ImportKind::ActualGeneration => Box::new(
                actual_generation::ActualGenerationImporter::setup(
                    &ctx,
                    &self.derived_source_name,
                    EmissionFactors::production_types().with_overrides(&self.co2_overrides),
                )
                .await?,
            ),
        };

        let mut days = Vec::with_capacity(self.dates.len());
        for day in self.dates.days() {
            metrics::counter!("import_days_total", "task" => self.kind.task_name()).increment(1);
            let result = match dates::day_window(day, self.area.timezone) {
                Ok((start, end)) => importer.import_day(&ctx, start, end).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                metrics::counter!("import_days_failed_total", "task" => self.kind.task_name()).increment(1);
                tracing::error!(%day, error = %e, "import failed for day");
            }
            days.push(DayOutcome { day, result });
        }

        Ok(ImportReport {
            kind: self.kind,
            area: self.area.code.clone(),
            days,
        })
    }
}

pub(crate) async fn ensure_entsoe_source(store: &dyn BeliefStore) -> Result<DataSource, ImportError> {
    store.ensure_data_source(ENTSOE_SOURCE_NAME, SOURCE_KIND, "").await
}

pub(crate) async fn ensure_derived_source(store: &dyn BeliefStore, name: &str) -> Result<DataSource, ImportError> {
    store
        .ensure_data_source(name, SOURCE_KIND, env!("CARGO_PKG_VERSION"))
        .await
}
