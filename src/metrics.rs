use log::{debug, info};
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::auth::Token;
use crate::error::{PipewatchError, Result};

/// One gauge submitted to the Datadog series endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub metric: String,
    /// `(unix timestamp, value)` pairs
    pub points: Vec<(i64, f64)>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub tags: Vec<String>,
}

impl MetricSeries {
    pub fn gauge(metric: &str, timestamp: i64, value: f64, tags: &[String]) -> Self {
        Self {
            metric: metric.to_string(),
            points: vec![(timestamp, value)],
            kind: "gauge",
            tags: tags.to_vec(),
        }
    }
}

#[derive(Serialize)]
struct SeriesPayload<'a> {
    series: &'a [MetricSeries],
}

/// Client for `POST /api/v1/series`.
pub struct MetricsClient {
    client: Client,
    series_url: Url,
    api_key: Token,
}

impl MetricsClient {
    pub fn new(api_url: &str, api_key: Token) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pipewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipewatchError::Config(format!("Failed to create HTTP client: {e}")))?;

        let series_url = Url::parse(&format!("{}/api/v1/series", api_url.trim_end_matches('/')))
            .map_err(|e| PipewatchError::Config(format!("Invalid metrics API URL: {e}")))?;

        Ok(Self {
            client,
            series_url,
            api_key,
        })
    }

    /// # Errors
    ///
    /// Returns `PipewatchError::ApiError` when the endpoint rejects the series.
    pub async fn send(&self, series: &[MetricSeries]) -> Result<()> {
        debug!("Submitting {} series to {}", series.len(), self.series_url);

        let response = self
            .client
            .post(self.series_url.clone())
            .header("DD-API-KEY", self.api_key.as_str())
            .json(&SeriesPayload { series })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(PipewatchError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        info!("{} series submitted", series.len());
        Ok(())
    }
}
