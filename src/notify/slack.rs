use log::debug;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::{PipewatchError, Result};

#[derive(Serialize)]
struct SlackPayload<'a> {
    channel: &'a str,
    text: &'a str,
}

/// Posts messages through a Slack incoming webhook.
pub struct SlackNotifier {
    client: Client,
    webhook_url: Url,
}

impl SlackNotifier {
    pub fn new(webhook_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("pipewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipewatchError::Config(format!("Failed to create HTTP client: {e}")))?;

        let webhook_url = Url::parse(webhook_url)
            .map_err(|e| PipewatchError::Config(format!("Invalid Slack webhook URL: {e}")))?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    pub async fn send(&self, channel: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&SlackPayload { channel, text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(PipewatchError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Slack message delivered to {channel}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_posts_channel_and_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/services/T000/B000/XXX")
            .match_body(Matcher::Json(json!({
                "channel": "#agent-platform-ops",
                "text": "Job(s) `foo` failed 3 times in a row.\n"
            })))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let notifier =
            SlackNotifier::new(&format!("{}/services/T000/B000/XXX", server.url())).unwrap();
        notifier
            .send("#agent-platform-ops", "Job(s) `foo` failed 3 times in a row.\n")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_reports_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(404)
            .with_body("channel_not_found")
            .create_async()
            .await;

        let notifier = SlackNotifier::new(&format!("{}/hook", server.url())).unwrap();
        let err = notifier.send("#nowhere", "hello").await.unwrap_err();

        assert!(err.to_string().contains("channel_not_found"));
    }

    #[test]
    fn test_invalid_webhook_url() {
        assert!(SlackNotifier::new("not a url").is_err());
    }
}
