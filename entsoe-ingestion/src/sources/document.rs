//! ENTSO-E XML market documents.
//!
//! Data comes as `Publication_MarketDocument` (prices) or `GL_MarketDocument`
//! (generation); both carry `TimeSeries` → `Period` → `Point`. Errors and
//! empty results come as `Acknowledgement_MarketDocument`.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::error::ImportError;

/// Direction of a generation time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// `inBiddingZone_Domain`: power produced into the zone.
    Generation,
    /// `outBiddingZone_Domain`: consumption, e.g. pumped storage.
    Consumption,
    Unspecified,
}

/// One period of one time series, with positions resolved to timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub psr_type: Option<String>,
    pub flow: Flow,
    pub resolution: TimeDelta,
    pub points: Vec<(DateTime<Utc>, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    TimeSeries(Vec<RawSeries>),
    /// Reason text of an acknowledgement document.
    Acknowledgement(String),
}

#[derive(Debug, Deserialize)]
struct MarketDocument {
    #[serde(rename = "TimeSeries", default)]
    time_series: Vec<XmlTimeSeries>,
}

#[derive(Debug, Deserialize)]
struct XmlTimeSeries {
    #[serde(rename = "curveType")]
    curve_type: Option<String>,
    #[serde(rename = "inBiddingZone_Domain.mRID")]
    in_domain: Option<IgnoredAny>,
    #[serde(rename = "outBiddingZone_Domain.mRID")]
    out_domain: Option<IgnoredAny>,
    #[serde(rename = "MktPSRType")]
    psr: Option<XmlPsrType>,
    #[serde(rename = "Period", default)]
    periods: Vec<XmlPeriod>,
}

#[derive(Debug, Deserialize)]
struct XmlPsrType {
    #[serde(rename = "psrType")]
    psr_type: String,
}

#[derive(Debug, Deserialize)]
struct XmlPeriod {
    #[serde(rename = "timeInterval")]
    time_interval: XmlInterval,
    resolution: String,
    #[serde(rename = "Point", default)]
    points: Vec<XmlPoint>,
}

#[derive(Debug, Deserialize)]
struct XmlInterval {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct XmlPoint {
    position: u32,
    quantity: Option<f64>,
    #[serde(rename = "price.amount")]
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Acknowledgement {
    #[serde(rename = "Reason", default)]
    reasons: Vec<XmlReason>,
}

#[derive(Debug, Deserialize)]
struct XmlReason {
    code: Option<String>,
    text: Option<String>,
}

pub fn parse_document(xml: &str) -> Result<Document, ImportError> {
    if xml.contains("Acknowledgement_MarketDocument") {
        return Ok(Document::Acknowledgement(parse_acknowledgement(xml)));
    }

    let doc: MarketDocument = quick_xml::de::from_str(xml)
        .map_err(|e| ImportError::ExternalService(format!("malformed ENTSO-E document: {e}")))?;

    let mut out = Vec::new();
    for ts in doc.time_series {
        let flow = match (&ts.in_domain, &ts.out_domain) {
            (Some(_), _) => Flow::Generation,
            (None, Some(_)) => Flow::Consumption,
            (None, None) => Flow::Unspecified,
        };
        let psr_type = ts.psr.map(|p| p.psr_type);
        let forward_fill = ts.curve_type.as_deref() == Some("A03");

        for period in ts.periods {
            out.push(resolve_period(period, psr_type.clone(), flow, forward_fill)?);
        }
    }
    Ok(Document::TimeSeries(out))
}

/// Reason texts joined, e.g. "No matching data found for Data item ...".
pub fn parse_acknowledgement(xml: &str) -> String {
    match quick_xml::de::from_str::<Acknowledgement>(xml) {
        Ok(ack) if !ack.reasons.is_empty() => ack
            .reasons
            .into_iter()
            .map(|r| match (r.code, r.text) {
                (Some(code), Some(text)) => format!("{text} (code {code})"),
                (None, Some(text)) => text,
                (Some(code), None) => format!("code {code}"),
                (None, None) => String::new(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        _ => "acknowledgement without reason".to_string(),
    }
}

fn resolve_period(
    period: XmlPeriod,
    psr_type: Option<String>,
    flow: Flow,
    forward_fill: bool,
) -> Result<RawSeries, ImportError> {
    let start = parse_timestamp(&period.time_interval.start)?;
    let end = parse_timestamp(&period.time_interval.end)?;
    let resolution = parse_resolution(&period.resolution).ok_or_else(|| {
        ImportError::ExternalService(format!("unsupported resolution '{}'", period.resolution))
    })?;

    let mut given: Vec<(u32, f64)> = period
        .points
        .iter()
        .filter_map(|p| p.quantity.or(p.price).map(|v| (p.position, v)))
        .filter(|(pos, _)| *pos >= 1)
        .collect();
    given.sort_by_key(|(pos, _)| *pos);

    let at = |pos: u32| {
        i32::try_from(pos - 1)
            .ok()
            .and_then(|steps| resolution.checked_mul(steps))
            .and_then(|offset| start.checked_add_signed(offset))
            .ok_or_else(|| {
                ImportError::ExternalService(format!(
                    "position {pos} at resolution '{}' is out of range",
                    period.resolution
                ))
            })
    };

    let points = if forward_fill {
        // A03 curves only list a point when the value changes.
        let slots = u32::try_from(((end - start).num_seconds() / resolution.num_seconds()).max(0))
            .map_err(|_| ImportError::ExternalService(format!("period {start} - {end} has too many slots")))?;
        let mut points = Vec::new();
        let mut given = given.into_iter().peekable();
        let mut current = None;
        for pos in 1..=slots {
            while let Some((_, value)) = given.next_if(|(p, _)| *p <= pos) {
                current = Some(value);
            }
            if let Some(value) = current {
                points.push((at(pos)?, value));
            }
        }
        points
    } else {
        given
            .into_iter()
            .map(|(pos, v)| Ok((at(pos)?, v)))
            .collect::<Result<Vec<_>, ImportError>>()?
    };

    Ok(RawSeries {
        psr_type,
        flow,
        resolution,
        points,
    })
}

/// ENTSO-E writes UTC timestamps as `2024-05-01T22:00Z`.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ImportError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%MZ")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| ImportError::ExternalService(format!("invalid timestamp '{s}': {e}")))
}

/// ISO-8601 durations as used by ENTSO-E: `PT15M`, `PT60M`, `PT1H`, `P1D`, `P7D`.
pub fn parse_resolution(s: &str) -> Option<TimeDelta> {
    let s = s.trim();
    if let Some(time) = s.strip_prefix("PT") {
        if let Some(minutes) = time.strip_suffix('M') {
            return positive(minutes).and_then(TimeDelta::try_minutes);
        }
        if let Some(hours) = time.strip_suffix('H') {
            return positive(hours).and_then(TimeDelta::try_hours);
        }
        return None;
    }
    let days = s.strip_prefix('P')?.strip_suffix('D')?;
    positive(days).and_then(TimeDelta::try_days)
}

fn positive(count: &str) -> Option<i64> {
    count.parse().ok().filter(|n| *n > 0)
}

/// Timestamp format of the `periodStart`/`periodEnd` request parameters.
pub fn format_period(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M").to_string()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_price_document() {
        let doc = parse_document(&prices_xml(&[10.5, 11.0, -2.25])).unwrap();
        let Document::TimeSeries(series) = doc else {
            panic!("expected time series");
        };

        assert_eq!(series.len(), 1);
        let s = &series[0];
        assert_eq!(s.resolution, TimeDelta::hours(1));
        assert_eq!(s.flow, Flow::Unspecified);
        assert_eq!(
            s.points,
            vec![
                (Utc.with_ymd_and_hms(2024, 4, 30, 22, 0, 0).unwrap(), 10.5),
                (Utc.with_ymd_and_hms(2024, 4, 30, 23, 0, 0).unwrap(), 11.0),
                (Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(), -2.25),
            ]
        );
    }

    #[test]
    fn distinguishes_generation_and_consumption() {
        let xml = generation_xml(&[
            generation_series_xml(Some("B10"), false, "PT60M", &[5.0]),
            generation_series_xml(Some("B10"), true, "PT60M", &[3.0]),
        ]);
        let Document::TimeSeries(series) = parse_document(&xml).unwrap() else {
            panic!("expected time series");
        };

        assert_eq!(series[0].flow, Flow::Generation);
        assert_eq!(series[0].psr_type.as_deref(), Some("B10"));
        assert_eq!(series[1].flow, Flow::Consumption);
    }

    #[test]
    fn forward_fills_a03_curves() {
        let xml = r#"<Publication_MarketDocument>
  <TimeSeries>
    <curveType>A03</curveType>
    <Period>
      <timeInterval><start>2024-05-01T00:00Z</start><end>2024-05-01T01:00Z</end></timeInterval>
      <resolution>PT15M</resolution>
      <Point><position>1</position><price.amount>50</price.amount></Point>
      <Point><position>3</position><price.amount>70</price.amount></Point>
    </Period>
  </TimeSeries>
</Publication_MarketDocument>"#;
        let Document::TimeSeries(series) = parse_document(xml).unwrap() else {
            panic!("expected time series");
        };

        let values: Vec<f64> = series[0].points.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![50.0, 50.0, 70.0, 70.0]);
        assert_eq!(
            series[0].points[3].0,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 45, 0).unwrap()
        );
    }

    #[test]
    fn recognises_acknowledgement() {
        let doc = parse_document(&acknowledgement_xml("No matching data found for Data item")).unwrap();
        match doc {
            Document::Acknowledgement(reason) => {
                assert!(reason.contains("No matching data found"));
                assert!(reason.contains("999"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_document_is_an_external_service_error() {
        let res = parse_document("<GL_MarketDocument><TimeSeries><Period>");
        assert!(matches!(res, Err(ImportError::ExternalService(_))));
    }

    #[test]
    fn parses_resolutions() {
        assert_eq!(parse_resolution("PT15M"), Some(TimeDelta::minutes(15)));
        assert_eq!(parse_resolution("PT60M"), Some(TimeDelta::hours(1)));
        assert_eq!(parse_resolution("PT1H"), Some(TimeDelta::hours(1)));
        assert_eq!(parse_resolution("P1D"), Some(TimeDelta::days(1)));
        assert_eq!(parse_resolution("P1Y"), None);
        assert_eq!(parse_resolution("PT0M"), None);
    }

    fn single_point_xml(resolution: &str, position: u64) -> String {
        format!(
            r#"<Publication_MarketDocument>
  <TimeSeries>
    <curveType>A01</curveType>
    <Period>
      <timeInterval><start>2024-05-01T00:00Z</start><end>2024-05-02T00:00Z</end></timeInterval>
      <resolution>{resolution}</resolution>
      <Point><position>{position}</position><price.amount>50</price.amount></Point>
    </Period>
  </TimeSeries>
</Publication_MarketDocument>"#
        )
    }

    #[test]
    fn out_of_range_resolution_is_rejected() {
        assert_eq!(parse_resolution("P999999999999D"), None);
        assert_eq!(parse_resolution("PT99999999999999999M"), None);

        let res = parse_document(&single_point_xml("P999999999999D", 1));
        assert!(matches!(res, Err(ImportError::ExternalService(_))));
    }

    #[test]
    fn position_beyond_representable_time_is_rejected() {
        let res = parse_document(&single_point_xml("P7D", 2_000_000_000));
        assert!(matches!(res, Err(ImportError::ExternalService(_))));
    }

    #[test]
    fn position_beyond_i32_is_rejected() {
        let res = parse_document(&single_point_xml("PT15M", 3_000_000_000));
        assert!(matches!(res, Err(ImportError::ExternalService(_))));
    }

    #[test]
    fn formats_request_period() {
        let ts = Utc.with_ymd_and_hms(2024, 4, 30, 22, 0, 0).unwrap();
        assert_eq!(format_period(ts), "202404302200");
    }
}
