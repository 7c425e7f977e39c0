use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PipewatchError, Result};

use super::alerts::AlertSet;
use super::model::{HistoryStore, JobExecution, JobHistory};

pub const DEFAULT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_CONSECUTIVE_THRESHOLD: usize = 3;
pub const DEFAULT_CUMULATIVE_THRESHOLD: usize = 5;

/// When a failure counter counts as having hit its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertMode {
    /// Report once, on the failing run where the counter equals the threshold
    #[default]
    OnThreshold,
    /// Report on every run while the counter is at or above the threshold
    AtLeast,
}

impl AlertMode {
    fn reached(self, count: usize, threshold: usize, failing_now: bool) -> bool {
        match self {
            Self::OnThreshold => failing_now && count == threshold,
            Self::AtLeast => count >= threshold,
        }
    }
}

/// Window size and alert thresholds used by [`update_statistics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrackerSettings {
    /// Number of most recent executions kept per job
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Failures in a row that trigger a "consecutive" alert
    #[serde(default = "default_consecutive_threshold")]
    pub consecutive_threshold: usize,

    /// Failures within the window that trigger a "cumulative" alert
    #[serde(default = "default_cumulative_threshold")]
    pub cumulative_threshold: usize,

    #[serde(default)]
    pub mode: AlertMode,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            consecutive_threshold: DEFAULT_CONSECUTIVE_THRESHOLD,
            cumulative_threshold: DEFAULT_CUMULATIVE_THRESHOLD,
            mode: AlertMode::default(),
        }
    }
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_consecutive_threshold() -> usize {
    DEFAULT_CONSECUTIVE_THRESHOLD
}

fn default_cumulative_threshold() -> usize {
    DEFAULT_CUMULATIVE_THRESHOLD
}

impl TrackerSettings {
    /// Checks that the window and thresholds can ever produce an alert.
    ///
    /// # Errors
    ///
    /// Returns `PipewatchError::Config` when a value is zero or a threshold
    /// is larger than the window.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(PipewatchError::Config(
                "window-size must be at least 1".to_string(),
            ));
        }

        for (name, threshold) in [
            ("consecutive-threshold", self.consecutive_threshold),
            ("cumulative-threshold", self.cumulative_threshold),
        ] {
            if threshold == 0 || threshold > self.window_size {
                return Err(PipewatchError::Config(format!(
                    "{name} must be between 1 and window-size ({}), got {threshold}",
                    self.window_size
                )));
            }
        }

        Ok(())
    }
}

/// Records the current pipeline run in every job's window and collects the
/// jobs that must be reported.
///
/// Every job known to the store or failing in this run receives exactly one
/// new slot: a failing slot carrying the run id when the job is part of
/// `current_failures`, a passing slot without id otherwise. Windows are then
/// trimmed to `settings.window_size` and `consecutive_failures` recomputed
/// from the window contents.
///
/// Known jobs are visited in store order, newly seen jobs in the order the
/// failure source reported them. When a job name is reported twice, the first
/// run id wins.
///
/// Returns the alerts together with the updated store, which is what the
/// caller persists for the next run.
pub fn update_statistics<'a>(
    mut store: HistoryStore,
    current_failures: impl IntoIterator<Item = (&'a str, u64)>,
    settings: &TrackerSettings,
) -> (AlertSet, HistoryStore) {
    let mut failed: IndexMap<&str, u64> = IndexMap::new();
    for (name, id) in current_failures {
        failed.entry(name).or_insert(id);
    }

    for name in failed.keys() {
        if !store.jobs.contains_key(*name) {
            debug!("First recorded failure for job {name}");
            store.jobs.insert((*name).to_string(), JobHistory::default());
        }
    }

    let mut alerts = AlertSet::default();

    for (name, history) in &mut store.jobs {
        let execution = match failed.get(name.as_str()) {
            Some(&id) => JobExecution::failed(id),
            None => JobExecution::passed(),
        };
        history.record(execution, settings.window_size);

        let failing_now = history.last_failing();

        if settings.mode.reached(
            history.consecutive_failures,
            settings.consecutive_threshold,
            failing_now,
        ) {
            alerts.consecutive.add(name, history.trailing_run());
        }

        if settings.mode.reached(
            history.cumulative_failures(),
            settings.cumulative_threshold,
            failing_now,
        ) {
            alerts.cumulative.add(name, history.failing_executions());
        }
    }

    debug!(
        "Updated {} job histories ({} failing, {} consecutive alerts, {} cumulative alerts)",
        store.jobs.len(),
        failed.len(),
        alerts.consecutive.len(),
        alerts.cumulative.len()
    );

    (alerts, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> JobExecution {
        JobExecution::passed()
    }

    fn fail(id: u64) -> JobExecution {
        JobExecution::failed(id)
    }

    fn job(consecutive_failures: usize, jobs_info: Vec<JobExecution>) -> JobHistory {
        JobHistory {
            consecutive_failures,
            jobs_info: jobs_info.into(),
        }
    }

    fn store(jobs: Vec<(&str, JobHistory)>) -> HistoryStore {
        HistoryStore {
            jobs: jobs
                .into_iter()
                .map(|(name, history)| (name.to_string(), history))
                .collect(),
            ..HistoryStore::default()
        }
    }

    fn pattern(history: &JobHistory) -> Vec<bool> {
        history.jobs_info.iter().map(|e| e.failing).collect()
    }

    #[cfg(test)]
    mod update_statistics {
        use super::*;

        fn nominal_store() -> HistoryStore {
            store(vec![
                (
                    "nafnaf",
                    job(
                        2,
                        vec![ok(), ok(), ok(), ok(), ok(), ok(), ok(), ok(), fail(42), fail(618)],
                    ),
                ),
                (
                    "noufnouf",
                    job(2, vec![fail(314), ok(), fail(1618), fail(21)]),
                ),
            ])
        }

        #[test]
        fn new_failing_job_starts_single_slot_history() {
            let failures = [("nifnif", 504_685_380), ("nafnaf", 504_685_380)];
            let (_, store) =
                update_statistics(nominal_store(), failures, &TrackerSettings::default());

            let nifnif = &store.jobs["nifnif"];
            assert_eq!(nifnif.consecutive_failures, 1);
            assert_eq!(nifnif.jobs_info.len(), 1);
            assert_eq!(nifnif.jobs_info[0], fail(504_685_380));
        }

        #[test]
        fn full_window_evicts_oldest_slot() {
            let failures = [("nifnif", 504_685_380), ("nafnaf", 504_685_380)];
            let (_, store) =
                update_statistics(nominal_store(), failures, &TrackerSettings::default());

            let nafnaf = &store.jobs["nafnaf"];
            assert_eq!(nafnaf.consecutive_failures, 3);
            assert_eq!(
                pattern(nafnaf),
                vec![false, false, false, false, false, false, false, true, true, true]
            );
        }

        #[test]
        fn job_absent_from_failures_records_passing_slot() {
            let failures = [("nifnif", 504_685_380), ("nafnaf", 504_685_380)];
            let (_, store) =
                update_statistics(nominal_store(), failures, &TrackerSettings::default());

            let noufnouf = &store.jobs["noufnouf"];
            assert_eq!(noufnouf.consecutive_failures, 0);
            assert_eq!(pattern(noufnouf), vec![true, false, true, true, false]);
            assert_eq!(noufnouf.jobs_info.back(), Some(&ok()));
        }

        #[test]
        fn reaching_consecutive_threshold_alerts_once() {
            let failures = [("nifnif", 504_685_380), ("nafnaf", 504_685_380)];
            let (alerts, _) =
                update_statistics(nominal_store(), failures, &TrackerSettings::default());

            assert_eq!(alerts.consecutive.len(), 1);
            assert!(alerts.consecutive.contains("nafnaf"));
            assert_eq!(alerts.cumulative.len(), 0);
            assert_eq!(
                alerts.consecutive.failures["nafnaf"],
                vec![fail(42), fail(618), fail(504_685_380)]
            );
        }

        #[test]
        fn multiple_failures_split_between_categories() {
            let failures = [("poulidor", 42), ("virenque", 42), ("bardet", 42)];
            let store = store(vec![
                (
                    "poulidor",
                    job(
                        8,
                        vec![
                            ok(),
                            ok(),
                            fail(42),
                            fail(42),
                            fail(42),
                            fail(42),
                            fail(42),
                            fail(42),
                            fail(42),
                            fail(42),
                        ],
                    ),
                ),
                (
                    "virenque",
                    job(
                        2,
                        vec![ok(), ok(), ok(), ok(), fail(42), ok(), fail(42), ok(), fail(42), fail(42)],
                    ),
                ),
                ("bardet", job(2, vec![fail(42), fail(42)])),
            ]);

            let (alerts, store) =
                update_statistics(store, failures, &TrackerSettings::default());

            assert_eq!(store.jobs["poulidor"].consecutive_failures, 9);
            assert_eq!(store.jobs["virenque"].consecutive_failures, 3);
            assert_eq!(store.jobs["bardet"].consecutive_failures, 3);

            assert_eq!(alerts.consecutive.len(), 2);
            assert!(alerts.consecutive.contains("virenque"));
            assert!(alerts.consecutive.contains("bardet"));

            assert_eq!(alerts.cumulative.len(), 1);
            assert!(alerts.cumulative.contains("virenque"));
            assert_eq!(alerts.cumulative.failures["virenque"].len(), 5);
        }

        #[test]
        fn stale_consecutive_counter_is_recomputed() {
            let store = store(vec![("lint", job(7, vec![ok(), fail(1)]))]);
            let (_, store) = update_statistics(store, [("lint", 2)], &TrackerSettings::default());

            assert_eq!(store.jobs["lint"].consecutive_failures, 2);
        }

        #[test]
        fn duplicate_failures_record_a_single_slot() {
            let failures = [("flaky", 10), ("flaky", 11)];
            let (_, store) =
                update_statistics(HistoryStore::default(), failures, &TrackerSettings::default());

            assert_eq!(store.jobs["flaky"].jobs_info.len(), 1);
            assert_eq!(store.jobs["flaky"].jobs_info[0], fail(10));
        }

        #[test]
        fn known_jobs_keep_order_and_new_jobs_are_appended() {
            let store = store(vec![("b", job(0, vec![ok()])), ("a", job(0, vec![ok()]))]);
            let (_, store) = update_statistics(
                store,
                [("z", 1), ("a", 1), ("c", 1)],
                &TrackerSettings::default(),
            );

            let names: Vec<_> = store.jobs.keys().map(String::as_str).collect();
            assert_eq!(names, vec!["b", "a", "z", "c"]);
        }

        #[test]
        fn window_never_exceeds_configured_size() {
            let settings = TrackerSettings {
                window_size: 4,
                consecutive_threshold: 2,
                cumulative_threshold: 3,
                ..TrackerSettings::default()
            };
            let mut store = HistoryStore::default();

            for run in 1..=12_u64 {
                let failures: Vec<(&str, u64)> = if run % 3 == 0 {
                    vec![]
                } else {
                    vec![("e2e", run)]
                };
                let (_, updated) = update_statistics(store, failures, &settings);
                store = updated;

                let history = &store.jobs["e2e"];
                assert!(history.jobs_info.len() <= 4);
                assert_eq!(history.consecutive_failures, history.trailing_failures());
            }
        }

        #[test]
        fn empty_inputs_produce_no_alerts() {
            let (alerts, store) = update_statistics(
                HistoryStore::default(),
                std::iter::empty(),
                &TrackerSettings::default(),
            );

            assert!(alerts.is_empty());
            assert!(store.is_empty());
        }
    }

    #[cfg(test)]
    mod alert_mode {
        use super::*;

        fn at_least() -> TrackerSettings {
            TrackerSettings {
                mode: AlertMode::AtLeast,
                ..TrackerSettings::default()
            }
        }

        #[test]
        fn on_threshold_ignores_jobs_beyond_threshold() {
            let store = store(vec![("build", job(3, vec![fail(1), fail(2), fail(3)]))]);
            let (alerts, _) = update_statistics(store, [("build", 4)], &TrackerSettings::default());

            assert!(alerts.consecutive.is_empty());
        }

        #[test]
        fn on_threshold_requires_failure_in_current_run() {
            let store = store(vec![(
                "build",
                job(0, vec![fail(1), fail(2), fail(3), fail(4), fail(5), ok()]),
            )]);
            let (alerts, _) = update_statistics(store, std::iter::empty(), &TrackerSettings::default());

            assert!(alerts.is_empty());
        }

        #[test]
        fn at_least_keeps_reporting_red_jobs() {
            let store = store(vec![("build", job(3, vec![fail(1), fail(2), fail(3)]))]);
            let (alerts, _) = update_statistics(store, [("build", 4)], &at_least());

            assert!(alerts.consecutive.contains("build"));
            assert_eq!(alerts.consecutive.failures["build"].len(), 4);
        }

        #[test]
        fn at_least_reports_cumulative_without_current_failure() {
            let store = store(vec![(
                "build",
                job(0, vec![fail(1), fail(2), fail(3), fail(4), fail(5), ok()]),
            )]);
            let (alerts, _) = update_statistics(store, std::iter::empty(), &at_least());

            assert!(alerts.consecutive.is_empty());
            assert!(alerts.cumulative.contains("build"));
        }

        #[test]
        fn long_trailing_run_lands_in_consecutive_only() {
            let settings = TrackerSettings {
                cumulative_threshold: 8,
                ..TrackerSettings::default()
            };
            let store = store(vec![("deploy", job(2, vec![ok(), ok(), fail(1), fail(2)]))]);
            let (alerts, _) = update_statistics(store, [("deploy", 3)], &settings);

            assert!(alerts.consecutive.contains("deploy"));
            assert!(!alerts.cumulative.contains("deploy"));
        }

        #[test]
        fn scattered_failures_land_in_cumulative_only() {
            let store = store(vec![(
                "deploy",
                job(
                    0,
                    vec![fail(1), ok(), fail(2), ok(), fail(3), ok(), fail(4), ok()],
                ),
            )]);
            let (alerts, _) = update_statistics(store, [("deploy", 5)], &TrackerSettings::default());

            assert!(alerts.cumulative.contains("deploy"));
            assert!(!alerts.consecutive.contains("deploy"));
        }
    }

    #[cfg(test)]
    mod validate {
        use super::*;

        #[test]
        fn accepts_defaults() {
            assert!(TrackerSettings::default().validate().is_ok());
        }

        #[test]
        fn rejects_empty_window() {
            let settings = TrackerSettings {
                window_size: 0,
                ..TrackerSettings::default()
            };
            assert!(settings.validate().is_err());
        }

        #[test]
        fn rejects_threshold_larger_than_window() {
            let settings = TrackerSettings {
                cumulative_threshold: 11,
                ..TrackerSettings::default()
            };
            let err = settings.validate().unwrap_err();
            assert!(err.to_string().contains("cumulative-threshold"));
        }

        #[test]
        fn rejects_zero_threshold() {
            let settings = TrackerSettings {
                consecutive_threshold: 0,
                ..TrackerSettings::default()
            };
            assert!(settings.validate().is_err());
        }
    }
}
