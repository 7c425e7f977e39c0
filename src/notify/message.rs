use std::fmt::Write;

use crate::history::{AlertKind, AlertSet, JobAlert, TrackerSettings};
use crate::providers::gitlab::job_id_to_url;

/// Where failing runs can be browsed, used to link alert evidence.
#[derive(Debug, Clone)]
pub struct JobLinks {
    pub base_url: String,
    pub project_path: String,
}

/// Renders the text of an alert notification.
///
/// Returns `None` when there is nothing to report.
pub fn format_alert_message(
    alerts: &AlertSet,
    settings: &TrackerSettings,
    links: Option<&JobLinks>,
) -> Option<String> {
    if alerts.is_empty() {
        return None;
    }

    let mut message = String::new();

    for kind in [AlertKind::Consecutive, AlertKind::Cumulative] {
        let alert = alerts.get(kind);
        if alert.is_empty() {
            continue;
        }

        let jobs = alert
            .job_names()
            .map(|job| format!("`{job}`"))
            .collect::<Vec<_>>()
            .join(", ");

        let _ = match kind {
            AlertKind::Consecutive => writeln!(
                message,
                "Job(s) {jobs} failed {} times in a row.",
                settings.consecutive_threshold
            ),
            AlertKind::Cumulative => writeln!(
                message,
                "Job(s) {jobs} failed {} times in last {} executions.",
                settings.cumulative_threshold, settings.window_size
            ),
        };

        if let Some(links) = links {
            push_links(&mut message, alert, links);
        }
    }

    Some(message)
}

fn push_links(message: &mut String, alert: &JobAlert, links: &JobLinks) {
    for (job, executions) in &alert.failures {
        let urls: Vec<String> = executions
            .iter()
            .filter_map(|execution| execution.id)
            .map(|id| job_id_to_url(&links.base_url, &links.project_path, id))
            .collect();

        if !urls.is_empty() {
            let _ = writeln!(message, "  - `{job}`: {}", urls.join(", "));
        }
    }
}
