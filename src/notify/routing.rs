use std::sync::OnceLock;

use indexmap::{IndexMap, IndexSet};
use regex::Regex;

use crate::history::AlertSet;

use super::owners::JobOwners;

/// Whether failures on `branch` go to team channels.
///
/// Only the default branch and release refs (`7.52.x`, `7.52.0`,
/// `7.52.0-rc.1`) qualify; failures on any other branch concern their author.
pub fn should_send_message_to_channel(branch: &str, default_branch: &str) -> bool {
    branch == default_branch || is_release_ref(branch)
}

const RELEASE_REF: &str = r"^\d+\.\d+\.(x|\d+)(-rc\.\d+)?$";

fn release_ref() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(RELEASE_REF).ok()).as_ref()
}

fn is_release_ref(branch: &str) -> bool {
    release_ref().is_some_and(|pattern| pattern.is_match(branch))
}

/// Maps alerted jobs to the Slack channels of their owners.
#[derive(Debug, Clone, Default)]
pub struct Routing {
    pub owners: JobOwners,
    /// Owner of jobs no rule matches
    pub default_owner: Option<String>,
    /// Owner (team handle) to channel
    pub channels: IndexMap<String, String>,
    /// Channel for owners without a mapping and for unowned jobs
    pub default_channel: String,
}

impl Routing {
    pub fn channel_for_owner(&self, owner: &str) -> &str {
        self.channels
            .get(owner)
            .map_or(self.default_channel.as_str(), String::as_str)
    }

    /// Distinct channels that must hear about `job`.
    pub fn channels_for_job(&self, job: &str) -> IndexSet<&str> {
        let owners = self.owners.owners_of(job);

        let channels: IndexSet<&str> = if owners.is_empty() {
            self.default_owner
                .iter()
                .map(|owner| self.channel_for_owner(owner))
                .collect()
        } else {
            owners
                .iter()
                .map(|owner| self.channel_for_owner(owner))
                .collect()
        };

        if channels.is_empty() {
            IndexSet::from([self.default_channel.as_str()])
        } else {
            channels
        }
    }

    /// Splits `alerts` into one alert set per destination channel.
    pub fn route(&self, alerts: &AlertSet) -> IndexMap<String, AlertSet> {
        let mut destinations: IndexSet<&str> = IndexSet::new();
        for job in alerts
            .consecutive
            .job_names()
            .chain(alerts.cumulative.job_names())
        {
            destinations.extend(self.channels_for_job(job));
        }

        destinations
            .into_iter()
            .map(|channel| {
                let routed = alerts.retain(|job| self.channels_for_job(job).contains(channel));
                (channel.to_string(), routed)
            })
            .collect()
    }
}
