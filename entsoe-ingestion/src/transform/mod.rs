pub mod co2;
pub mod resample;
pub mod series;

pub use co2::{co2_intensity_series, combine_mix, intensity, EmissionFactors, GenerationMix};
pub use resample::resample;
pub use series::Series;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::ImportError;

/// Pure validation of a series before it is transformed or stored.
///
/// Rules:
/// - every value must be finite.
/// - every timestamp must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_series(name: &str, series: &Series) -> Result<(), ImportError> {
    let min_ts = sanity_bound(2000);
    let max_ts = sanity_bound(2100);

    for (ts, value) in series.points() {
        if !value.is_finite() {
            metrics::counter!("validation_series_rejected_total").increment(1);
            return Err(ImportError::Computation(format!("{name}: value at {ts} is not a finite number")));
        }
        if ts < min_ts || ts > max_ts {
            metrics::counter!("validation_series_rejected_total").increment(1);
            return Err(ImportError::Computation(format!("{name}: timestamp {ts} out of allowed range")));
        }
    }
    Ok(())
}

fn sanity_bound(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
