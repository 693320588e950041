use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::{EntsoeConfig, ServerSettings};
use crate::error::ImportError;
use crate::sources::document::{self, Document, Flow, RawSeries};
use crate::sources::psr_type;
use crate::sources::MarketArea;
use crate::transform::Series;

pub const PRICE_UNIT: &str = "EUR/MWh";
pub const POWER_UNIT: &str = "MW";

/// ENTSO-E Transparency Platform REST client.
#[derive(Clone)]
pub struct EntsoeClient {
    url: String,
    token: String,
    client: Client,
    retry_count: u32,
    retry_delay: Duration,
}

impl EntsoeClient {
    pub fn new(server: ServerSettings, config: &EntsoeConfig) -> Result<Self, ImportError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ImportError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: server.url,
            token: server.auth_token,
            client,
            retry_count: config.retry_count,
            retry_delay: config.retry_delay(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Day-ahead prices in EUR/MWh.
    pub async fn query_day_ahead_prices(
        &self,
        area: &MarketArea,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Series, ImportError> {
        let raw = self
            .fetch("A44", None, &[("in_Domain", area.eic.as_str()), ("out_Domain", area.eic.as_str())], start, end)
            .await?;

        merge_finest(raw.iter(), PRICE_UNIT, start, end)
            .ok_or_else(|| no_data("day-ahead prices", area, start, end))
    }

    /// Total scheduled generation in MW. Consumption series are left out.
    pub async fn query_generation_forecast(
        &self,
        area: &MarketArea,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Series, ImportError> {
        let raw = self
            .fetch("A71", Some("A01"), &[("in_Domain", area.eic.as_str())], start, end)
            .await?;

        merge_finest(
            raw.iter().filter(|s| s.flow != Flow::Consumption),
            POWER_UNIT,
            start,
            end,
        )
        .ok_or_else(|| no_data("generation forecast", area, start, end))
    }

    /// Solar and wind forecasts in MW, keyed by "Solar", "Wind Onshore" and
    /// "Wind Offshore". Areas without e.g. offshore wind simply lack that key.
    pub async fn query_wind_and_solar_forecast(
        &self,
        area: &MarketArea,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Series>, ImportError> {
        let raw = self
            .fetch("A69", Some("A01"), &[("in_Domain", area.eic.as_str())], start, end)
            .await?;

        let columns = group_by_psr_type(&raw, start, end, |code| match code {
            psr_type::SOLAR | psr_type::WIND_ONSHORE | psr_type::WIND_OFFSHORE => psr_type::label(code),
            _ => None,
        });
        if columns.is_empty() {
            return Err(no_data("wind and solar forecast", area, start, end));
        }
        Ok(columns)
    }

    /// Actual generation per production type in MW, keyed by production type
    /// (e.g. "fossil_gas"). Unknown PSR codes keep their code as key.
    pub async fn query_generation_per_type(
        &self,
        area: &MarketArea,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Series>, ImportError> {
        let raw = self
            .fetch("A75", Some("A16"), &[("in_Domain", area.eic.as_str())], start, end)
            .await?;

        let columns = group_by_psr_type(&raw, start, end, |code| {
            Some(psr_type::production_type(code).unwrap_or(code))
        });
        if columns.is_empty() {
            return Err(no_data("actual generation per type", area, start, end));
        }
        Ok(columns)
    }

    async fn fetch(
        &self,
        document_type: &str,
        process_type: Option<&str>,
        domains: &[(&str, &str)],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawSeries>, ImportError> {
        let mut query: Vec<(&str, String)> = vec![
            ("securityToken", self.token.clone()),
            ("documentType", document_type.to_string()),
        ];
        if let Some(process_type) = process_type {
            query.push(("processType", process_type.to_string()));
        }
        for &(param, eic) in domains {
            query.push((param, eic.to_string()));
        }
        query.push(("periodStart", document::format_period(start)));
        query.push(("periodEnd", document::format_period(end)));

        info!(document_type, %start, %end, url = %self.url, "querying ENTSO-E");
        metrics::counter!("entsoe_requests_total", "document_type" => document_type.to_string()).increment(1);

        let result = self.send_with_retry(&query).await;
        let body = match result {
            Ok(body) => body,
            Err(e) => {
                metrics::counter!("entsoe_request_failures_total", "document_type" => document_type.to_string())
                    .increment(1);
                return Err(e);
            }
        };

        match document::parse_document(&body) {
            Ok(Document::TimeSeries(series)) => {
                debug!(document_type, series = series.len(), "parsed ENTSO-E document");
                Ok(series)
            }
            Ok(Document::Acknowledgement(reason)) => {
                metrics::counter!("entsoe_request_failures_total", "document_type" => document_type.to_string())
                    .increment(1);
                Err(ImportError::ExternalService(format!("ENTSO-E: {reason}")))
            }
            Err(e) => {
                metrics::counter!("entsoe_request_failures_total", "document_type" => document_type.to_string())
                    .increment(1);
                Err(e)
            }
        }
    }

    /// Connection and timeout failures are retried; everything else is final.
    async fn send_with_retry(&self, query: &[(&str, String)]) -> Result<String, ImportError> {
        let mut attempt = 0;
        let response = loop {
            match self.client.get(&self.url).query(query).send().await {
                Ok(response) => break response,
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.retry_count => {
                    attempt += 1;
                    warn!(attempt, error = %e.without_url(), "ENTSO-E request failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    return Err(ImportError::ExternalService(format!(
                        "ENTSO-E request failed: {}",
                        e.without_url()
                    )))
                }
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ImportError::ExternalService(format!("failed to read ENTSO-E response: {}", e.without_url())))?;

        if status.is_success() {
            return Ok(body);
        }

        let reason = if body.contains("Acknowledgement_MarketDocument") {
            document::parse_acknowledgement(&body)
        } else if status == StatusCode::UNAUTHORIZED {
            "unauthorized, check the auth token".to_string()
        } else {
            body.chars().take(200).collect()
        };
        Err(ImportError::ExternalService(format!("ENTSO-E returned {status}: {reason}")))
    }
}

fn no_data(what: &str, area: &MarketArea, start: DateTime<Utc>, end: DateTime<Utc>) -> ImportError {
    ImportError::ExternalService(format!("no {what} for {} between {start} and {end}", area.code))
}

/// Merge raw periods into one series at the finest resolution present,
/// clipped to `[start, end)`. Duplicate timestamps keep the first value.
fn merge_finest<'a, I>(raw: I, unit: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Series>
where
    I: Iterator<Item = &'a RawSeries> + Clone,
{
    let finest = raw.clone().map(|s| s.resolution).min()?;
    let mut series = Series::new(unit, finest);
    for s in raw.filter(|s| s.resolution == finest) {
        for (ts, value) in &s.points {
            series.insert_if_absent(*ts, *value);
        }
    }
    let series = series.within(start, end);
    (!series.is_empty()).then_some(series)
}

fn group_by_psr_type<'a, F>(
    raw: &'a [RawSeries],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    key: F,
) -> BTreeMap<String, Series>
where
    F: Fn(&'a str) -> Option<&'a str>,
{
    let mut grouped: BTreeMap<&str, Vec<&RawSeries>> = BTreeMap::new();
    for s in raw.iter().filter(|s| s.flow != Flow::Consumption) {
        let Some(code) = s.psr_type.as_deref() else {
            continue;
        };
        if let Some(name) = key(code) {
            grouped.entry(name).or_default().push(s);
        }
    }

    grouped
        .into_iter()
        .filter_map(|(name, series)| {
            merge_finest(series.into_iter(), POWER_UNIT, start, end).map(|s| (name.to_string(), s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::document::fixtures::*;
    use chrono::{TimeDelta, TimeZone};
    use mockito::{Matcher, Server};

    fn area() -> MarketArea {
        MarketArea::resolve("NL", None).unwrap()
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 4, 30, 22, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap(),
        )
    }

    fn client(url: String, retry_count: u32) -> EntsoeClient {
        let config = EntsoeConfig {
            retry_count,
            timeout_secs: 5,
            ..EntsoeConfig::default()
        };
        let server = ServerSettings {
            url,
            auth_token: "test_token".to_string(),
        };
        EntsoeClient::new(server, &config).unwrap()
    }

    #[tokio::test]
    async fn sends_documented_parameters_and_parses_prices() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("securityToken".into(), "test_token".into()),
                Matcher::UrlEncoded("documentType".into(), "A44".into()),
                Matcher::UrlEncoded("in_Domain".into(), "10YNL----------L".into()),
                Matcher::UrlEncoded("out_Domain".into(), "10YNL----------L".into()),
                Matcher::UrlEncoded("periodStart".into(), "202404302200".into()),
                Matcher::UrlEncoded("periodEnd".into(), "202405012200".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(prices_xml(&[10.0, 20.0]))
            .create_async()
            .await;

        let (start, end) = window();
        let prices = client(format!("{}/api", server.url()), 1)
            .query_day_ahead_prices(&area(), start, end)
            .await
            .unwrap();

        assert_eq!(prices.unit, PRICE_UNIT);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices.get(start), Some(10.0));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn acknowledgement_is_an_external_service_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(acknowledgement_xml("No matching data found for Data item"))
            .create_async()
            .await;

        let (start, end) = window();
        let res = client(format!("{}/api", server.url()), 1)
            .query_day_ahead_prices(&area(), start, end)
            .await;

        match res {
            Err(ImportError::ExternalService(msg)) => assert!(msg.contains("No matching data found")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let (start, end) = window();
        let res = client(format!("{}/api", server.url()), 3)
            .query_generation_forecast(&area(), start, end)
            .await;

        assert!(matches!(res, Err(ImportError::ExternalService(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_failure_is_an_external_service_error() {
        let (start, end) = window();
        let res = client("http://127.0.0.1:1/api".to_string(), 1)
            .query_day_ahead_prices(&area(), start, end)
            .await;

        assert!(matches!(res, Err(ImportError::ExternalService(_))));
    }

    #[tokio::test]
    async fn generation_forecast_ignores_consumption_and_keeps_finest_resolution() {
        let mut server = Server::new_async().await;
        let body = generation_xml(&[
            generation_series_xml(None, false, "PT60M", &[400.0, 400.0]),
            generation_series_xml(None, false, "PT15M", &[100.0, 110.0, 120.0]),
            generation_series_xml(None, true, "PT15M", &[999.0]),
        ]);
        let _mock = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("documentType".into(), "A71".into()))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let (start, end) = window();
        let series = client(format!("{}/api", server.url()), 1)
            .query_generation_forecast(&area(), start, end)
            .await
            .unwrap();

        assert_eq!(series.resolution, TimeDelta::minutes(15));
        let values: Vec<f64> = series.points().map(|(_, v)| v).collect();
        assert_eq!(values, vec![100.0, 110.0, 120.0]);
    }

    #[tokio::test]
    async fn wind_and_solar_are_keyed_by_label() {
        let mut server = Server::new_async().await;
        let body = generation_xml(&[
            generation_series_xml(Some("B16"), false, "PT60M", &[0.0, 5.0]),
            generation_series_xml(Some("B19"), false, "PT60M", &[30.0, 35.0]),
        ]);
        let _mock = server
            .mock("GET", "/api")
            .match_query(Matcher::UrlEncoded("documentType".into(), "A69".into()))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let (start, end) = window();
        let columns = client(format!("{}/api", server.url()), 1)
            .query_wind_and_solar_forecast(&area(), start, end)
            .await
            .unwrap();

        assert_eq!(columns.keys().cloned().collect::<Vec<_>>(), vec!["Solar", "Wind Onshore"]);
        assert_eq!(columns["Wind Onshore"].get(start), Some(30.0));
    }

    #[tokio::test]
    async fn generation_per_type_uses_production_type_names() {
        let mut server = Server::new_async().await;
        let body = generation_xml(&[
            generation_series_xml(Some("B04"), false, "PT15M", &[200.0]),
            generation_series_xml(Some("B14"), false, "PT15M", &[480.0]),
            generation_series_xml(Some("B10"), true, "PT15M", &[50.0]),
        ]);
        let _mock = server
            .mock("GET", "/api")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("documentType".into(), "A75".into()),
                Matcher::UrlEncoded("processType".into(), "A16".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let (start, end) = window();
        let columns = client(format!("{}/api", server.url()), 1)
            .query_generation_per_type(&area(), start, end)
            .await
            .unwrap();

        assert_eq!(
            columns.keys().cloned().collect::<Vec<_>>(),
            vec!["fossil_gas", "nuclear"]
        );
    }

    #[test]
    fn merge_clips_to_window_and_keeps_first_duplicate() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let h = TimeDelta::hours(1);
        let raw = [
            RawSeries {
                psr_type: None,
                flow: Flow::Unspecified,
                resolution: h,
                points: vec![(t0 - h, 1.0), (t0, 2.0), (t0 + h, 3.0)],
            },
            RawSeries {
                psr_type: None,
                flow: Flow::Unspecified,
                resolution: h,
                points: vec![(t0 + h, 99.0)],
            },
        ];

        let series = merge_finest(raw.iter(), PRICE_UNIT, t0, t0 + h * 2).unwrap();
        assert_eq!(series.points().collect::<Vec<_>>(), vec![(t0, 2.0), (t0 + h, 3.0)]);
        assert!(merge_finest(raw.iter(), PRICE_UNIT, t0 + h * 5, t0 + h * 6).is_none());
    }
}
