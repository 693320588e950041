//! CO₂ intensity of a generation mix.
//!
//! The intensity at a timestamp is the power-weighted mean of the emission
//! factors of the technologies in the mix. Technologies without a factor are
//! left out of both the weighted sum and the total power.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::ImportError;
use crate::transform::Series;

pub const CO2_INTENSITY_UNIT: &str = "kg/MWh";

pub const SCHEDULED_GENERATION: &str = "Scheduled generation";
pub const SOLAR: &str = "Solar";
pub const WIND_ONSHORE: &str = "Wind Onshore";
pub const WIND_OFFSHORE: &str = "Wind Offshore";

/// Shares of fossil fuels in scheduled ("grey") generation (NL, 2020).
pub const GREY_ENERGY_MIX: [(&str, f64); 3] = [("gas", 0.598), ("oil", 0.045), ("coal", 0.0718)];

/// Life-cycle emissions in kg CO₂ per MWh.
pub const KG_CO2_PER_MWH: [(&str, f64); 6] = [
    ("coal", 870.0),
    ("gas", 464.0),
    ("solar", 44.5),
    // ca. 75% of coal
    ("oil", 652.0),
    ("wind_onshore", 14.0),
    ("wind_offshore", 17.0),
];

/// Net emission factors per ENTSO-E production type (Tranberg et al., 2019).
/// `None` marks types whose factor is unknown; they stay out of the table.
pub const PRODUCTION_TYPE_KG_CO2_PER_MWH: [(&str, Option<f64>); 20] = [
    ("biomass", Some(50.4)),
    ("fossil_brown_coal_or_lignite", None),
    ("fossil_coal_derived_gas", None),
    ("fossil_gas", Some(464.0)),
    ("fossil_hard_coal", Some(1030.0)),
    ("fossil_oil", Some(1010.0)),
    ("fossil_oil_shale", None),
    ("fossil_peat", None),
    ("geothermal", Some(0.00664)),
    ("hydro_pumped_storage", Some(611.0)),
    ("hydro_run_of_river_and_poundage", Some(0.0253)),
    ("hydro_water_reservoir", Some(8.13)),
    ("marine", None),
    ("nuclear", Some(10.1)),
    // EU28
    ("other", Some(927.0)),
    ("other_renewable", None),
    ("solar", Some(0.00591)),
    // placeholder: takes the biomass factor
    ("waste", Some(50.4)),
    ("wind_offshore", Some(0.133)),
    ("wind_onshore", Some(0.133)),
];

/// Power per technology label at one timestamp.
pub type GenerationMix = BTreeMap<String, f64>;

/// Emission factors (kg CO₂ per MWh) keyed by technology label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmissionFactors {
    factors: BTreeMap<String, f64>,
}

impl EmissionFactors {
    pub fn new<I, K>(factors: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            factors: factors.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Factors for the day-ahead forecast mix: scheduled generation is valued
    /// at the grey mix, solar and wind at their own factors.
    pub fn day_ahead_forecast() -> Self {
        let kg = |tech: &str| {
            KG_CO2_PER_MWH
                .iter()
                .find(|(name, _)| *name == tech)
                .map(|(_, f)| *f)
                .unwrap_or_default()
        };
        let grey: f64 = GREY_ENERGY_MIX.iter().map(|(fuel, share)| share * kg(fuel)).sum();
        tracing::debug!(grey_intensity_factor = grey, "grey intensity factor");

        Self::new([
            (SCHEDULED_GENERATION, grey),
            (SOLAR, kg("solar")),
            (WIND_ONSHORE, kg("wind_onshore")),
            (WIND_OFFSHORE, kg("wind_offshore")),
        ])
    }

    pub fn production_types() -> Self {
        Self::new(
            PRODUCTION_TYPE_KG_CO2_PER_MWH
                .iter()
                .filter_map(|(name, factor)| factor.map(|f| (*name, f))),
        )
    }

    pub fn with_overrides(mut self, overrides: &BTreeMap<String, f64>) -> Self {
        for (tech, factor) in overrides {
            self.factors.insert(tech.clone(), *factor);
        }
        self
    }

    pub fn get(&self, tech: &str) -> Option<f64> {
        self.factors.get(tech).copied()
    }
}

/// Mix-weighted CO₂ intensity, or `None` when no known technology contributes
/// positive total power.
pub fn intensity(mix: &GenerationMix, factors: &EmissionFactors) -> Result<Option<f64>, ImportError> {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (tech, power) in mix {
        if !power.is_finite() {
            return Err(ImportError::Computation(format!("power for '{tech}' is not a finite number")));
        }
        let Some(factor) = factors.get(tech) else {
            continue;
        };
        if !factor.is_finite() {
            return Err(ImportError::Computation(format!(
                "emission factor for '{tech}' is not a finite number"
            )));
        }
        weighted += power * factor;
        total += power;
    }

    if total > 0.0 {
        Ok(Some(weighted / total))
    } else {
        Ok(None)
    }
}

/// CO₂ intensity per timestamp. Timestamps without a defined intensity are skipped.
pub fn co2_intensity_series(
    mixes: &BTreeMap<DateTime<Utc>, GenerationMix>,
    factors: &EmissionFactors,
    resolution: TimeDelta,
) -> Result<Series, ImportError> {
    let mut out = Series::new(CO2_INTENSITY_UNIT, resolution);
    let mut skipped = 0usize;
    for (ts, mix) in mixes {
        match intensity(mix, factors)? {
            Some(value) => out.insert(*ts, value),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "timestamps without positive generation skipped");
    }
    Ok(out)
}

/// Turn per-technology series into one mix per timestamp. A technology
/// without a value at a timestamp is absent from that mix.
pub fn combine_mix<'a, I>(columns: I) -> BTreeMap<DateTime<Utc>, GenerationMix>
where
    I: IntoIterator<Item = (&'a str, &'a Series)>,
{
    let mut mixes: BTreeMap<DateTime<Utc>, GenerationMix> = BTreeMap::new();
    for (tech, series) in columns {
        for (ts, power) in series.points() {
            mixes.entry(ts).or_default().insert(tech.to_string(), power);
        }
    }
    mixes
}

/// Drop the mixes that lack `tech`, returning how many were dropped.
pub fn retain_with(mixes: &mut BTreeMap<DateTime<Utc>, GenerationMix>, tech: &str) -> usize {
    let before = mixes.len();
    mixes.retain(|_, mix| mix.contains_key(tech));
    before - mixes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn mix(entries: &[(&str, f64)]) -> GenerationMix {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn weighted_average_of_known_technologies() {
        let factors = EmissionFactors::new([("coal", 0.9), ("wind", 0.0)]);
        let value = intensity(&mix(&[("coal", 100.0), ("wind", 50.0)]), &factors).unwrap();
        assert_relative_eq!(value.unwrap(), 0.6);
    }

    #[test]
    fn unknown_technology_is_excluded_from_both_sums() {
        let factors = EmissionFactors::new([("coal", 0.9)]);
        let value = intensity(&mix(&[("coal", 100.0), ("unknown", 50.0)]), &factors).unwrap();
        assert_relative_eq!(value.unwrap(), 0.9);
    }

    #[test]
    fn zero_total_or_empty_mix_has_no_intensity() {
        let factors = EmissionFactors::new([("coal", 0.9), ("wind", 0.0)]);
        assert_eq!(intensity(&mix(&[("coal", 0.0), ("wind", 0.0)]), &factors).unwrap(), None);
        assert_eq!(intensity(&GenerationMix::new(), &factors).unwrap(), None);
        assert_eq!(intensity(&mix(&[("unknown", 10.0)]), &factors).unwrap(), None);
    }

    #[test]
    fn non_finite_power_is_a_computation_error() {
        let factors = EmissionFactors::new([("coal", 0.9)]);
        let res = intensity(&mix(&[("coal", f64::NAN)]), &factors);
        assert!(matches!(res, Err(ImportError::Computation(_))));
    }

    #[test]
    fn series_skips_timestamps_without_generation() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t1 = t0 + TimeDelta::minutes(15);
        let factors = EmissionFactors::new([("coal", 0.9), ("wind", 0.0)]);
        let mixes = BTreeMap::from([
            (t0, mix(&[("coal", 100.0), ("wind", 50.0)])),
            (t1, mix(&[("coal", 0.0)])),
        ]);

        let series = co2_intensity_series(&mixes, &factors, TimeDelta::minutes(15)).unwrap();
        assert_eq!(series.len(), 1);
        assert_relative_eq!(series.get(t0).unwrap(), 0.6);
        assert_eq!(series.unit, CO2_INTENSITY_UNIT);
    }

    #[test]
    fn combine_mix_takes_union_of_timestamps() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t1 = t0 + TimeDelta::hours(1);
        let grey = Series::from_points("MW", TimeDelta::hours(1), [(t0, 100.0), (t1, 80.0)]);
        let solar = Series::from_points("MW", TimeDelta::hours(1), [(t1, 20.0)]);

        let mixes = combine_mix([(SCHEDULED_GENERATION, &grey), (SOLAR, &solar)]);
        assert_eq!(mixes[&t0], mix(&[(SCHEDULED_GENERATION, 100.0)]));
        assert_eq!(mixes[&t1], mix(&[(SCHEDULED_GENERATION, 80.0), (SOLAR, 20.0)]));
    }

    #[test]
    fn mixes_without_scheduled_generation_are_dropped() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t1 = t0 + TimeDelta::minutes(15);
        let grey = Series::from_points("MW", TimeDelta::minutes(15), [(t0, 100.0)]);
        let wind = Series::from_points("MW", TimeDelta::minutes(15), [(t0, 50.0), (t1, 60.0)]);

        let mut mixes = combine_mix([(SCHEDULED_GENERATION, &grey), (WIND_ONSHORE, &wind)]);
        assert_eq!(retain_with(&mut mixes, SCHEDULED_GENERATION), 1);

        let series = co2_intensity_series(&mixes, &EmissionFactors::day_ahead_forecast(), TimeDelta::minutes(15)).unwrap();
        assert_eq!(series.len(), 1);
        assert!(series.get(t0).is_some());
        assert_eq!(series.get(t1), None);
    }

    #[test]
    fn day_ahead_grey_factor_is_share_weighted() {
        let factors = EmissionFactors::day_ahead_forecast();
        assert_relative_eq!(
            factors.get(SCHEDULED_GENERATION).unwrap(),
            0.598 * 464.0 + 0.045 * 652.0 + 0.0718 * 870.0
        );
        assert_eq!(factors.get(SOLAR), Some(44.5));
        assert_eq!(factors.get(WIND_OFFSHORE), Some(17.0));
    }

    #[test]
    fn production_type_table_leaves_out_unknown_factors() {
        let factors = EmissionFactors::production_types();
        assert_eq!(factors.get("fossil_peat"), None);
        assert_eq!(factors.get("waste"), factors.get("biomass"));
        assert_eq!(factors.get("nuclear"), Some(10.1));
    }

    #[test]
    fn overrides_replace_and_extend() {
        let overrides = BTreeMap::from([(SOLAR.to_string(), 40.0), ("Nuclear".to_string(), 12.0)]);
        let factors = EmissionFactors::day_ahead_forecast().with_overrides(&overrides);
        assert_eq!(factors.get(SOLAR), Some(40.0));
        assert_eq!(factors.get("Nuclear"), Some(12.0));
    }

    #[test]
    fn overrides_take_effect_in_the_table_using_their_key() {
        let overrides = BTreeMap::from([(SOLAR.to_string(), 40.0), ("fossil_gas".to_string(), 400.0)]);

        let forecast = EmissionFactors::day_ahead_forecast().with_overrides(&overrides);
        assert_eq!(forecast.get(SOLAR), Some(40.0));
        assert_eq!(
            forecast.get(SCHEDULED_GENERATION),
            EmissionFactors::day_ahead_forecast().get(SCHEDULED_GENERATION)
        );

        let per_type = EmissionFactors::production_types().with_overrides(&overrides);
        assert_eq!(per_type.get("fossil_gas"), Some(400.0));
        assert_eq!(per_type.get("solar"), Some(0.00591));
    }
}
