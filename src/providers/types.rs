use serde::{Deserialize, Serialize};

/// A job whose final attempt failed in the pipeline being checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedJob {
    /// Job name as defined in .gitlab-ci.yml
    pub name: String,
    /// Id of the failing attempt
    pub id: u64,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub web_url: Option<String>,
    /// Whether the job may fail without failing the pipeline
    #[serde(default)]
    pub allow_failure: bool,
}

/// Failures of one pipeline, split by whether they break the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailedJobs {
    pub mandatory: Vec<FailedJob>,
    pub optional: Vec<FailedJob>,
}

impl FailedJobs {
    pub fn add_failed_job(&mut self, job: FailedJob) {
        if job.allow_failure {
            self.optional.push(job);
        } else {
            self.mandatory.push(job);
        }
    }

    /// Every failure, mandatory ones first.
    pub fn all_failures(&self) -> impl Iterator<Item = &FailedJob> {
        self.mandatory.iter().chain(self.optional.iter())
    }

    /// `(job name, run id)` pairs as consumed by the history tracker.
    pub fn executions(&self) -> impl Iterator<Item = (&str, u64)> {
        self.all_failures().map(|job| (job.name.as_str(), job.id))
    }

    pub fn len(&self) -> usize {
        self.mandatory.len() + self.optional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<FailedJob> for FailedJobs {
    fn from_iter<I: IntoIterator<Item = FailedJob>>(iter: I) -> Self {
        let mut failed = Self::default();
        for job in iter {
            failed.add_failed_job(job);
        }
        failed
    }
}
