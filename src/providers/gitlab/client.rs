use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Token;
use crate::error::{PipewatchError, Result};

use super::types::GitLabJob;

const MAX_RETRIES: u32 = 30;
const RETRY_DELAY_SECONDS: u64 = 10;
const PAGE_SIZE: usize = 100;

pub struct GitLabClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
    max_retries: u32,
    retry_delay: Duration,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pipewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipewatchError::Config(format!("Failed to create HTTP client: {e}")))?;

        // A missing trailing slash would make `join` drop the last path segment
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let api_url = Url::parse(&base_url)
            .map_err(|e| PipewatchError::Config(format!("Invalid base URL: {e}")))?
            .join("api/v4/")
            .map_err(|e| PipewatchError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECONDS),
        })
    }

    /// Overrides how often and how patiently transient failures are retried.
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Helper to build authenticated requests
    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Construct project base URL
    pub fn project_url(&self, project_id: &str) -> Result<Url> {
        self.api_url
            .join(&format!("projects/{}/", urlencoding::encode(project_id)))
            .map_err(|e| PipewatchError::Config(format!("Invalid project URL: {e}")))
    }

    /// Execute a GET request with automatic retry on network errors, rate
    /// limits and server errors.
    ///
    /// Returns the decoded body and the `x-next-page` header, if any.
    async fn get_json<T>(&self, url: Url) -> Result<(T, Option<u32>)>
    where
        T: DeserializeOwned,
    {
        let mut retry_count = 0;
        loop {
            let request = self.auth_request(self.client.get(url.clone()));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
                    if retry_count >= self.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({}), retrying in {}s ({}/{})...",
                        e,
                        self.retry_delay.as_secs(),
                        retry_count + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(PipewatchError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: self.max_retries,
                    });
                }

                warn!(
                    "GitLab API error (status {status}). Waiting {} seconds before retry {}/{}...",
                    self.retry_delay.as_secs(),
                    retry_count + 1,
                    self.max_retries
                );

                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(PipewatchError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok());

            return Ok((response.json().await?, next_page));
        }
    }

    /// Fetches every job attempt of a pipeline, retried attempts included.
    pub async fn fetch_pipeline_jobs(
        &self,
        project_path: &str,
        pipeline_id: u64,
    ) -> Result<Vec<GitLabJob>> {
        let jobs_url = self
            .project_url(project_path)?
            .join(&format!("pipelines/{pipeline_id}/jobs"))
            .map_err(|e| PipewatchError::Config(format!("Invalid jobs URL: {e}")))?;

        let mut all_jobs = Vec::new();
        let mut page = 1;

        loop {
            let mut url = jobs_url.clone();
            url.query_pairs_mut()
                .append_pair("include_retried", "true")
                .append_pair("per_page", &PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let (jobs, next_page): (Vec<GitLabJob>, _) = self.get_json(url).await?;
            let fetched = jobs.len();
            all_jobs.extend(jobs);

            debug!("Fetched {fetched} jobs from page {page} of pipeline {pipeline_id}");

            match next_page {
                Some(next) if fetched > 0 && next > page => page = next,
                _ => break,
            }
        }

        Ok(all_jobs)
    }
}
