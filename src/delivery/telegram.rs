use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::DeliveryChannel;
use crate::config::TelegramConfig;
use crate::error::DeliveryError;
use crate::subscriber::SubscriberId;

/// Telegram Bot API channel; the subscriber id is the chat id.
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    bot_token: String,
    parse_mode: Option<String>,
}

impl TelegramChannel {
    pub fn new(
        config: &TelegramConfig,
        bot_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            parse_mode: config.parse_mode.clone(),
        })
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, to: SubscriberId, text: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let mut body = json!({
            "chat_id": to.0,
            "text": text,
        });
        if let Some(mode) = &self.parse_mode {
            body["parse_mode"] = Value::String(mode.clone());
        }

        let resp = self.client.post(&url).json(&body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Api(error_text));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer, parse_mode: Option<&str>) -> TelegramChannel {
        let config = TelegramConfig {
            api_base: server.uri(),
            parse_mode: parse_mode.map(String::from),
        };
        TelegramChannel::new(&config, "123:abc", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn send_posts_to_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({ "chat_id": 42, "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        channel(&server, None).send(SubscriberId(42), "hello").await.unwrap();
    }

    #[tokio::test]
    async fn parse_mode_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({ "chat_id": 1, "text": "<b>x</b>", "parse_mode": "HTML" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        channel(&server, Some("HTML"))
            .send(SubscriberId(1), "<b>x</b>")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn api_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("Forbidden: bot was blocked by the user"),
            )
            .mount(&server)
            .await;

        let err = channel(&server, None).send(SubscriberId(7), "hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Api(msg) if msg.contains("blocked")));
    }
}
