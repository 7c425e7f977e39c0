/// Builds the web URL of a pipeline.
///
/// # Arguments
///
/// * `base_url` - GitLab instance base URL (e.g., <https://gitlab.com>)
/// * `project_path` - Project path (e.g., "group/project")
/// * `id` - Numeric pipeline id
///
/// # Returns
///
/// Clickable URL to the pipeline (e.g., <https://gitlab.com/group/project/-/pipelines/123>)
pub fn pipeline_id_to_url(base_url: &str, project_path: &str, id: u64) -> String {
    format!("{}/{project_path}/-/pipelines/{id}", base_url.trim_end_matches('/'))
}

/// Builds the web URL of a job.
///
/// # Returns
///
/// Clickable URL to the job (e.g., <https://gitlab.com/group/project/-/jobs/456>)
pub fn job_id_to_url(base_url: &str, project_path: &str, id: u64) -> String {
    format!("{}/{project_path}/-/jobs/{id}", base_url.trim_end_matches('/'))
}
