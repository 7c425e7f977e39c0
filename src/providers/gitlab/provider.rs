use std::collections::HashMap;
use std::time::Duration;

use log::{info, warn};

use crate::auth::Token;
use crate::error::Result;
use crate::providers::types::{FailedJob, FailedJobs};

use super::client::GitLabClient;
use super::links::pipeline_id_to_url;
use super::types::GitLabJob;

/// GitLab source of pipeline failures.
///
/// Fetches every job attempt of a pipeline from the REST API and keeps the
/// jobs whose final attempt failed.
pub struct GitLabProvider {
    pub client: GitLabClient,
    pub project_path: String,
    pub base_url: String,
}

impl GitLabProvider {
    /// Creates a new GitLab provider for the specified project.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitLab instance base URL (e.g., <https://gitlab.com>)
    /// * `project_path` - Project path (e.g., "group/project")
    /// * `token` - Optional authentication token
    ///
    /// # Errors
    ///
    /// Returns an error if the API endpoint URL cannot be constructed.
    pub fn new(base_url: &str, project_path: String, token: Option<Token>) -> Result<Self> {
        let client = GitLabClient::new(base_url, token)?;

        Ok(Self {
            client,
            project_path,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Overrides how often and how patiently API calls are retried.
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.client = self.client.with_retry_policy(max_retries, retry_delay);
        self
    }

    /// Web page of a pipeline of this project.
    pub fn pipeline_url(&self, pipeline_id: u64) -> String {
        pipeline_id_to_url(&self.base_url, &self.project_path, pipeline_id)
    }

    /// Collects the failed jobs of a pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the API requests fail after retries or the
    /// response cannot be decoded.
    pub async fn failed_jobs(&self, pipeline_id: u64) -> Result<FailedJobs> {
        info!(
            "Fetching jobs of pipeline {pipeline_id} for project: {} ({})",
            self.project_path,
            self.pipeline_url(pipeline_id)
        );

        let jobs = self
            .client
            .fetch_pipeline_jobs(&self.project_path, pipeline_id)
            .await?;

        if jobs.is_empty() {
            warn!("No jobs found for pipeline {pipeline_id}");
        }

        let failed = final_failures(jobs);

        info!(
            "Pipeline {pipeline_id}: {} failed jobs ({} allowed to fail)",
            failed.len(),
            failed.optional.len()
        );

        Ok(failed)
    }
}

/// Keeps one entry per job name: its most recent attempt, when that attempt
/// failed. Results are ordered by attempt id.
fn final_failures(jobs: Vec<GitLabJob>) -> FailedJobs {
    let mut latest = latest_attempts(jobs);
    latest.sort_by_key(|job| job.id);

    latest
        .into_iter()
        .filter(is_job_failed)
        .map(|job| FailedJob {
            name: job.name,
            id: job.id,
            stage: job.stage,
            web_url: job.web_url,
            allow_failure: job.allow_failure,
        })
        .collect()
}

fn latest_attempts(jobs: Vec<GitLabJob>) -> Vec<GitLabJob> {
    jobs.into_iter()
        .fold(HashMap::new(), |mut latest: HashMap<String, GitLabJob>, job| {
            match latest.get(&job.name) {
                Some(existing) if existing.id >= job.id => {}
                _ => {
                    latest.insert(job.name.clone(), job);
                }
            }
            latest
        })
        .into_values()
        .collect()
}

fn is_job_failed(job: &GitLabJob) -> bool {
    job.status == "failed"
}
