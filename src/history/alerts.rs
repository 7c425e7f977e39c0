use indexmap::IndexMap;
use serde::Serialize;

use super::model::JobExecution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Consecutive,
    Cumulative,
}

/// Jobs that crossed one alert threshold, with the failing runs backing it.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct JobAlert {
    pub failures: IndexMap<String, Vec<JobExecution>>,
}

impl JobAlert {
    pub fn add(&mut self, job: &str, evidence: Vec<JobExecution>) {
        self.failures.insert(job.to_string(), evidence);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn contains(&self, job: &str) -> bool {
        self.failures.contains_key(job)
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.failures.keys().map(String::as_str)
    }
}

/// Outcome of a statistics update: which jobs must be reported, and why.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AlertSet {
    pub consecutive: JobAlert,
    pub cumulative: JobAlert,
}

impl AlertSet {
    pub fn is_empty(&self) -> bool {
        self.consecutive.is_empty() && self.cumulative.is_empty()
    }

    pub fn get(&self, kind: AlertKind) -> &JobAlert {
        match kind {
            AlertKind::Consecutive => &self.consecutive,
            AlertKind::Cumulative => &self.cumulative,
        }
    }

    /// Keeps only the jobs accepted by `keep`, in both categories.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> Self {
        let filter = |alert: &JobAlert| JobAlert {
            failures: alert
                .failures
                .iter()
                .filter(|(job, _)| keep(job))
                .map(|(job, evidence)| (job.clone(), evidence.clone()))
                .collect(),
        };

        Self {
            consecutive: filter(&self.consecutive),
            cumulative: filter(&self.cumulative),
        }
    }
}
