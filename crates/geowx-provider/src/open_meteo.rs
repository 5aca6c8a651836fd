//! Open-Meteo historical archive client

use crate::{ProviderError, ProviderResult};
use geowx_core::{SeriesRequest, WeatherProvider, WeatherSeries, DAY_FORMAT};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: WeatherSeries,
}

pub struct OpenMeteoProvider {
    client: Client,
    base_url: Url,
}

impl OpenMeteoProvider {
    pub fn new(base_url: &str) -> ProviderResult<Self> {
        let base_url = parse_endpoint(base_url)?;
        let client = Client::builder().build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, request: &SeriesRequest) -> ProviderResult<Url> {
        match request
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(url) => parse_endpoint(url),
            None => Ok(self.base_url.clone()),
        }
    }

    /// Query string for one archive request
    pub fn query_params(request: &SeriesRequest) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", request.location.latitude.to_string()),
            ("longitude", request.location.longitude.to_string()),
            ("start_date", request.start.format(DAY_FORMAT).to_string()),
            ("end_date", request.end.format(DAY_FORMAT).to_string()),
            ("daily", request.fields.join(",")),
            ("timezone", "auto".to_string()),
        ]
    }

    pub async fn fetch(&self, request: &SeriesRequest) -> ProviderResult<WeatherSeries> {
        let url = self.endpoint(request)?;
        debug!(%url, start = %request.start, end = %request.end, "requesting daily series");

        let resp = self
            .client
            .get(url)
            .query(&Self::query_params(request))
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "weather request failed");
                ProviderError::Request(e)
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(%status, %body, "weather provider returned an error");
            return Err(ProviderError::Status { status, body });
        }

        let bytes = resp.bytes().await?;
        let archive: ArchiveResponse = serde_json::from_slice(&bytes).map_err(|e| {
            error!(error = %e, "unexpected weather response");
            ProviderError::Malformed(e.to_string())
        })?;
        Ok(archive.daily)
    }
}

fn parse_endpoint(url: &str) -> ProviderResult<Url> {
    Url::parse(url).map_err(|e| ProviderError::InvalidEndpoint(format!("{}: {}", url, e)))
}

#[async_trait::async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn name(&self) -> &str {
        "open-meteo"
    }

    async fn daily_series(&self, request: &SeriesRequest) -> anyhow::Result<WeatherSeries> {
        Ok(self.fetch(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use geowx_core::Coordinate;

    fn request() -> SeriesRequest {
        SeriesRequest {
            location: Coordinate::new(52.52, 13.41),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            fields: vec!["temperature_2m_mean".into(), "precipitation_sum".into()],
            endpoint: None,
        }
    }

    #[test]
    fn test_query_params() {
        let params = OpenMeteoProvider::query_params(&request());
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("latitude"), Some("52.52"));
        assert_eq!(get("longitude"), Some("13.41"));
        assert_eq!(get("start_date"), Some("2024-01-01"));
        assert_eq!(get("end_date"), Some("2024-01-03"));
        assert_eq!(get("daily"), Some("temperature_2m_mean,precipitation_sum"));
        assert_eq!(get("timezone"), Some("auto"));
    }

    #[test]
    fn test_endpoint_override() {
        let provider = OpenMeteoProvider::new("https://archive.example/v1/archive").unwrap();

        let mut req = request();
        assert_eq!(
            provider.endpoint(&req).unwrap().as_str(),
            "https://archive.example/v1/archive"
        );

        req.endpoint = Some("  ".into());
        assert_eq!(provider.endpoint(&req).unwrap(), *provider.base_url());

        req.endpoint = Some("https://mirror.example/archive".into());
        assert_eq!(
            provider.endpoint(&req).unwrap().as_str(),
            "https://mirror.example/archive"
        );

        req.endpoint = Some("::nope".into());
        assert!(matches!(
            provider.endpoint(&req),
            Err(ProviderError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_archive_response_decoding() {
        let json = r#"{
            "latitude": 52.5,
            "longitude": 13.4,
            "timezone": "Europe/Berlin",
            "daily_units": {"time": "iso8601", "temperature_2m_mean": "°C"},
            "daily": {
                "time": ["2024-01-01", "2024-01-02"],
                "temperature_2m_mean": [1.2, null]
            }
        }"#;
        let archive: ArchiveResponse = serde_json::from_str(json).unwrap();
        assert_eq!(archive.daily.time.len(), 2);
        assert_eq!(archive.daily.numeric_at("temperature_2m_mean", 0), Some(1.2));
    }
}
