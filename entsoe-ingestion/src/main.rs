use std::path::PathBuf;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use entsoe_ingestion::{
    config::AppConfig,
    metrics_export, observability,
    pipeline::RelativeDay,
    sinks::{BeliefStore, MemoryBeliefStore, PgBeliefStore},
    ImportKind, ImportRequest, ImportSession,
};

#[derive(Parser, Debug)]
#[command(name = "entsoe", version, about = "Import ENTSO-E transparency data into the time-series store")]
struct Cli {
    /// Config file; defaults to $ENTSOE_CONFIG or ./entsoe-config.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import forecasted generation and derive its CO₂ intensity, defaulting to today and tomorrow.
    ///
    /// Best run a few hours after 13:00, when tomorrow's forecasts are announced.
    ImportDayAheadGeneration(CommonArgs),
    /// Import day-ahead prices, defaulting to today and tomorrow.
    ImportDayAheadPrices {
        #[command(flatten)]
        common: CommonArgs,
        /// Sensor to store the prices into, instead of "Day-ahead prices"
        #[arg(long)]
        sensor: Option<i64>,
        /// Source to tag the prices with, instead of "ENTSO-E"
        #[arg(long)]
        source: Option<i64>,
    },
    /// Import realised generation per production type and derive its CO₂ intensity, defaulting to yesterday.
    ImportActualGeneration(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Query data from this date onwards (YYYY-MM-DD)
    #[arg(long)]
    from_date: Option<NaiveDate>,
    /// Query data until this date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    to_date: Option<NaiveDate>,
    /// Import a single day relative to today
    #[arg(long, value_enum, conflicts_with_all = ["from_date", "to_date"])]
    day: Option<RelativeDay>,
    /// ENTSO-E country code (such as BE, DE, FR or NL)
    #[arg(long = "country")]
    country: Option<String>,
    /// Timezone for the country (such as 'Europe/Amsterdam')
    #[arg(long = "timezone")]
    timezone: Option<String>,
    /// Do everything except saving the data
    #[arg(long)]
    dryrun: bool,
}

impl CommonArgs {
    fn into_request(self) -> ImportRequest {
        ImportRequest {
            from_date: self.from_date,
            to_date: self.to_date,
            day: self.day,
            country: self.country,
            timezone: self.timezone,
            dryrun: self.dryrun,
            sensor_id: None,
            source_id: None,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let cfg = AppConfig::load(cli.config.as_deref())?;
    cfg.report_missing_settings();

    let metrics = match &cfg.metrics {
        Some(metrics_cfg) => Some((metrics_export::init()?, metrics_cfg.textfile.clone())),
        None => None,
    };

    let (kind, request) = match cli.command {
        Command::ImportDayAheadGeneration(common) => (ImportKind::DayAheadGeneration, common.into_request()),
        Command::ImportDayAheadPrices { common, sensor, source } => (
            ImportKind::DayAheadPrices,
            ImportRequest {
                sensor_id: sensor,
                source_id: source,
                ..common.into_request()
            },
        ),
        Command::ImportActualGeneration(common) => (ImportKind::ActualGeneration, common.into_request()),
    };

    // Settings and token are checked before anything is contacted.
    let session = ImportSession::prepare(kind, &cfg, &request, Utc::now())?;

    let store: Box<dyn BeliefStore> = match &cfg.database {
        Some(db) => Box::new(PgBeliefStore::connect(db, &cfg.sink).await?),
        None if request.dryrun => {
            tracing::warn!("no database configured, dry run uses an in-memory store");
            Box::new(MemoryBeliefStore::new())
        }
        None => anyhow::bail!("no database configured; set [database] uri or DATABASE_URL"),
    };

    let report = session.run(store.as_ref()).await;

    if let Some((handle, path)) = &metrics {
        if let Err(e) = metrics_export::write_textfile(handle, path) {
            tracing::warn!(error = %e, path = %path.display(), "failed to write metrics textfile");
        }
    }

    let report = report?;
    println!("{report}");
    if !report.succeeded() {
        anyhow::bail!("{} of {} days failed", report.failed_days(), report.days.len());
    }
    Ok(())
}
