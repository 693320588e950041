use std::str::FromStr;

use chrono_tz::Tz;

use crate::error::ImportError;

/// A bidding zone / country ENTSO-E publishes data for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketArea {
    /// Code as given by the user, e.g. "NL" or "DE_LU".
    pub code: String,
    /// Energy Identification Code used in API requests.
    pub eic: String,
    pub timezone: Tz,
}

/// (code, EIC, IANA timezone)
const AREAS: &[(&str, &str, &str)] = &[
    ("AL", "10YAL-KESH-----5", "Europe/Tirane"),
    ("AT", "10YAT-APG------L", "Europe/Vienna"),
    ("BA", "10YBA-JPCC-----D", "Europe/Sarajevo"),
    ("BE", "10YBE----------2", "Europe/Brussels"),
    ("BG", "10YCA-BULGARIA-R", "Europe/Sofia"),
    ("CH", "10YCH-SWISSGRIDZ", "Europe/Zurich"),
    ("CZ", "10YCZ-CEPS-----N", "Europe/Prague"),
    ("DE", "10Y1001A1001A83F", "Europe/Berlin"),
    ("DE_LU", "10Y1001A1001A82H", "Europe/Berlin"),
    ("DK", "10Y1001A1001A65H", "Europe/Copenhagen"),
    ("DK_1", "10YDK-1--------W", "Europe/Copenhagen"),
    ("DK_2", "10YDK-2--------M", "Europe/Copenhagen"),
    ("EE", "10Y1001A1001A39I", "Europe/Tallinn"),
    ("ES", "10YES-REE------0", "Europe/Madrid"),
    ("FI", "10YFI-1--------U", "Europe/Helsinki"),
    ("FR", "10YFR-RTE------C", "Europe/Paris"),
    ("GB", "10YGB----------A", "Europe/London"),
    ("GR", "10YGR-HTSO-----Y", "Europe/Athens"),
    ("HR", "10YHR-HEP------M", "Europe/Zagreb"),
    ("HU", "10YHU-MAVIR----U", "Europe/Budapest"),
    ("IE", "10YIE-1001A00010", "Europe/Dublin"),
    ("IE_SEM", "10Y1001A1001A59C", "Europe/Dublin"),
    ("IT", "10YIT-GRTN-----B", "Europe/Rome"),
    ("IT_NORD", "10Y1001A1001A73I", "Europe/Rome"),
    ("LT", "10YLT-1001A0008Q", "Europe/Vilnius"),
    ("LU", "10YLU-CEGEDEL-NQ", "Europe/Luxembourg"),
    ("LV", "10YLV-1001A00074", "Europe/Riga"),
    ("ME", "10YCS-CG-TSO---S", "Europe/Podgorica"),
    ("MK", "10YMK-MEPSO----8", "Europe/Skopje"),
    ("NL", "10YNL----------L", "Europe/Amsterdam"),
    ("NO", "10YNO-0--------C", "Europe/Oslo"),
    ("NO_1", "10YNO-1--------2", "Europe/Oslo"),
    ("NO_2", "10YNO-2--------T", "Europe/Oslo"),
    ("NO_3", "10YNO-3--------J", "Europe/Oslo"),
    ("NO_4", "10YNO-4--------9", "Europe/Oslo"),
    ("NO_5", "10Y1001A1001A48H", "Europe/Oslo"),
    ("PL", "10YPL-AREA-----S", "Europe/Warsaw"),
    ("PT", "10YPT-REN------W", "Europe/Lisbon"),
    ("RO", "10YRO-TEL------P", "Europe/Bucharest"),
    ("RS", "10YCS-SERBIATSOV", "Europe/Belgrade"),
    ("SE", "10YSE-1--------K", "Europe/Stockholm"),
    ("SE_1", "10Y1001A1001A44P", "Europe/Stockholm"),
    ("SE_2", "10Y1001A1001A45N", "Europe/Stockholm"),
    ("SE_3", "10Y1001A1001A46L", "Europe/Stockholm"),
    ("SE_4", "10Y1001A1001A47J", "Europe/Stockholm"),
    ("SI", "10YSI-ELES-----O", "Europe/Ljubljana"),
    ("SK", "10YSK-SEPS-----K", "Europe/Bratislava"),
];

impl MarketArea {
    /// Resolve a country/bidding-zone code, or a raw EIC code.
    ///
    /// `timezone` overrides the area's own timezone and is required for raw EIC codes.
    pub fn resolve(code: &str, timezone: Option<&str>) -> Result<Self, ImportError> {
        let code = code.trim();
        let timezone = timezone.map(parse_timezone).transpose()?;

        if let Some((known, eic, tz)) = AREAS.iter().find(|(c, _, _)| c.eq_ignore_ascii_case(code)) {
            return Ok(Self {
                code: known.to_string(),
                eic: eic.to_string(),
                timezone: match timezone {
                    Some(tz) => tz,
                    None => parse_timezone(tz)?,
                },
            });
        }

        if is_eic(code) {
            let timezone = timezone.ok_or_else(|| {
                ImportError::Configuration(format!("a timezone is required for EIC area code '{code}'"))
            })?;
            return Ok(Self {
                code: code.to_string(),
                eic: code.to_string(),
                timezone,
            });
        }

        Err(ImportError::Configuration(format!("unknown ENTSO-E country code '{code}'")))
    }
}

fn is_eic(code: &str) -> bool {
    code.len() == 16 && code.starts_with("10Y") && code.is_ascii()
}

fn parse_timezone(name: &str) -> Result<Tz, ImportError> {
    Tz::from_str(name.trim()).map_err(|_| ImportError::Configuration(format!("unknown timezone '{name}'")))
}
