use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One pipeline run of a job, as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecution {
    /// GitLab job id of the failing run, `None` for passing (or absent) runs
    pub id: Option<u64>,
    pub failing: bool,
}

impl JobExecution {
    pub fn failed(id: u64) -> Self {
        Self {
            id: Some(id),
            failing: true,
        }
    }

    pub fn passed() -> Self {
        Self {
            id: None,
            failing: false,
        }
    }
}

/// Rolling window of the most recent executions of a single job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobHistory {
    pub consecutive_failures: usize,
    pub jobs_info: VecDeque<JobExecution>,
}

impl JobHistory {
    /// Appends an execution, evicts the oldest slots beyond `window_size`
    /// and recomputes `consecutive_failures`.
    pub fn record(&mut self, execution: JobExecution, window_size: usize) {
        self.jobs_info.push_back(execution);
        self.truncate(window_size);
    }

    /// Keeps only the `window_size` most recent slots.
    pub fn truncate(&mut self, window_size: usize) {
        while self.jobs_info.len() > window_size {
            self.jobs_info.pop_front();
        }
        self.consecutive_failures = self.trailing_failures();
    }

    /// Number of failing slots at the end of the window.
    pub fn trailing_failures(&self) -> usize {
        self.jobs_info
            .iter()
            .rev()
            .take_while(|execution| execution.failing)
            .count()
    }

    /// Number of failing slots anywhere in the window.
    pub fn cumulative_failures(&self) -> usize {
        self.jobs_info.iter().filter(|execution| execution.failing).count()
    }

    pub fn last_failing(&self) -> bool {
        self.jobs_info.back().is_some_and(|execution| execution.failing)
    }

    /// The trailing run of failing slots, oldest first.
    pub fn trailing_run(&self) -> Vec<JobExecution> {
        let start = self.jobs_info.len() - self.trailing_failures();
        self.jobs_info.iter().skip(start).cloned().collect()
    }

    /// Every failing slot in the window, oldest first.
    pub fn failing_executions(&self) -> Vec<JobExecution> {
        self.jobs_info
            .iter()
            .filter(|execution| execution.failing)
            .cloned()
            .collect()
    }
}

/// Persisted failure history for every job of a project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryStore {
    /// Last pipeline that updated this document, 0 when never updated
    #[serde(default)]
    pub pipeline_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub jobs: IndexMap<String, JobHistory>,
}

impl HistoryStore {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(pattern: &[bool]) -> JobHistory {
        let mut history = JobHistory::default();
        for (idx, failing) in pattern.iter().enumerate() {
            let execution = if *failing {
                JobExecution::failed(idx as u64 + 1)
            } else {
                JobExecution::passed()
            };
            history.record(execution, 10);
        }
        history
    }

    #[test]
    fn test_trailing_failures_stops_at_first_pass() {
        let history = history(&[true, false, true, true]);
        assert_eq!(history.trailing_failures(), 2);
        assert_eq!(history.consecutive_failures, 2);
        assert_eq!(history.cumulative_failures(), 3);
    }

    #[test]
    fn test_trailing_failures_on_empty_history() {
        let history = JobHistory::default();
        assert_eq!(history.trailing_failures(), 0);
        assert!(history.trailing_run().is_empty());
        assert!(!history.last_failing());
    }

    #[test]
    fn test_record_evicts_oldest() {
        let mut history = history(&[true; 10]);
        history.record(JobExecution::passed(), 10);

        assert_eq!(history.jobs_info.len(), 10);
        assert_eq!(history.consecutive_failures, 0);
        assert_eq!(history.jobs_info.front(), Some(&JobExecution::failed(2)));
    }

    #[test]
    fn test_trailing_run_keeps_chronological_order() {
        let history = history(&[true, false, true, true]);
        let ids: Vec<_> = history.trailing_run().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![Some(3), Some(4)]);
    }

    #[test]
    fn test_store_serializes_expected_shape() {
        let mut store = HistoryStore::default();
        store.pipeline_id = 456;
        store.jobs.insert("unit-tests".to_string(), history(&[false, true]));

        let value = serde_json::to_value(&store).unwrap();
        assert_eq!(value["pipeline_id"], 456);
        assert_eq!(value["jobs"]["unit-tests"]["consecutive_failures"], 1);
        assert_eq!(
            value["jobs"]["unit-tests"]["jobs_info"][0],
            serde_json::json!({"id": null, "failing": false})
        );
        assert!(value.get("updated_at").is_none());
    }
}
