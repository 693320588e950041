//! ENTSO-E production (PSR) type codes.

/// (code, production type, display label)
const PSR_TYPES: &[(&str, &str, &str)] = &[
    ("B01", "biomass", "Biomass"),
    ("B02", "fossil_brown_coal_or_lignite", "Fossil Brown coal/Lignite"),
    ("B03", "fossil_coal_derived_gas", "Fossil Coal-derived gas"),
    ("B04", "fossil_gas", "Fossil Gas"),
    ("B05", "fossil_hard_coal", "Fossil Hard coal"),
    ("B06", "fossil_oil", "Fossil Oil"),
    ("B07", "fossil_oil_shale", "Fossil Oil shale"),
    ("B08", "fossil_peat", "Fossil Peat"),
    ("B09", "geothermal", "Geothermal"),
    ("B10", "hydro_pumped_storage", "Hydro Pumped Storage"),
    ("B11", "hydro_run_of_river_and_poundage", "Hydro Run-of-river and poundage"),
    ("B12", "hydro_water_reservoir", "Hydro Water Reservoir"),
    ("B13", "marine", "Marine"),
    ("B14", "nuclear", "Nuclear"),
    ("B15", "other_renewable", "Other renewable"),
    ("B16", "solar", "Solar"),
    ("B17", "waste", "Waste"),
    ("B18", "wind_offshore", "Wind Offshore"),
    ("B19", "wind_onshore", "Wind Onshore"),
    ("B20", "other", "Other"),
];

pub const SOLAR: &str = "B16";
pub const WIND_OFFSHORE: &str = "B18";
pub const WIND_ONSHORE: &str = "B19";

/// Snake-case production type, e.g. "fossil_gas" for B04.
pub fn production_type(code: &str) -> Option<&'static str> {
    PSR_TYPES.iter().find(|(c, _, _)| *c == code).map(|(_, t, _)| *t)
}

/// Human-readable label, e.g. "Wind Onshore" for B19.
pub fn label(code: &str) -> Option<&'static str> {
    PSR_TYPES.iter().find(|(c, _, _)| *c == code).map(|(_, _, l)| *l)
}
