use serde::{Deserialize, Serialize};

/// A job attempt as returned by the GitLab REST API.
///
/// Retried attempts share their `name` with the final one; the attempt with
/// the highest `id` is the most recent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabJob {
    pub id: u64,
    /// Job name as defined in .gitlab-ci.yml
    pub name: String,
    #[serde(default)]
    pub stage: String,
    /// Job status (e.g., "success", "failed", "canceled")
    pub status: String,
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default)]
    pub web_url: Option<String>,
}
