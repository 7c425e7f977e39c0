mod message;
mod owners;
mod routing;
mod slack;

use log::info;

use crate::error::Result;
use crate::history::{AlertSet, TrackerSettings};
use crate::output::{cyan, dim};

use message::format_alert_message;
pub use message::JobLinks;
pub use owners::JobOwners;
pub use routing::{should_send_message_to_channel, Routing};
pub use slack::SlackNotifier;

/// How rendered alerts leave the process.
pub enum Delivery {
    Stdout,
    Slack(SlackNotifier),
}

/// Turns an [`AlertSet`] into one message per destination channel.
pub struct AlertNotifier {
    delivery: Delivery,
    routing: Routing,
    settings: TrackerSettings,
    links: Option<JobLinks>,
}

impl AlertNotifier {
    pub fn new(
        delivery: Delivery,
        routing: Routing,
        settings: TrackerSettings,
        links: Option<JobLinks>,
    ) -> Self {
        Self {
            delivery,
            routing,
            settings,
            links,
        }
    }

    /// Sends the alerts to their owners' channels and returns how many
    /// messages went out. Nothing is sent for an empty alert set.
    ///
    /// # Errors
    ///
    /// Returns an error on the first message Slack refuses.
    pub async fn send_notification(&self, alerts: &AlertSet) -> Result<usize> {
        if alerts.is_empty() {
            info!("No job reached an alert threshold");
            return Ok(0);
        }

        let mut sent = 0;

        for (channel, routed) in self.routing.route(alerts) {
            let Some(text) = format_alert_message(&routed, &self.settings, self.links.as_ref())
            else {
                continue;
            };

            match &self.delivery {
                Delivery::Stdout => {
                    println!("{} {}\n{text}", dim("Would send to"), cyan(&channel));
                }
                Delivery::Slack(slack) => {
                    slack.send(&channel, &text).await?;
                    info!("Alert sent to {channel}");
                }
            }

            sent += 1;
        }

        Ok(sent)
    }
}
