//! OpenAI-compatible chat-completions transformer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::ContentTransformer;
use crate::config::TransformerConfig;
use crate::error::TransformError;
use crate::source::CandidateItem;

const SYSTEM_PROMPT: &str = "You are a professional news editor for a Telegram channel. \
Rewrite the source news item into an original, publish-ready post. Keep the tone neutral \
and informative. Always finish the post with a link to the source.";

pub struct OpenAiTransformer {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiTransformer {
    pub fn new(
        config: &TransformerConfig,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransformError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn user_prompt(item: &CandidateItem) -> String {
        format!(
            "Title: {}\n\nSummary: {}\n\nSource: {}",
            item.title, item.summary, item.permalink
        )
    }
}

#[async_trait]
impl ContentTransformer for OpenAiTransformer {
    async fn rewrite(&self, item: &CandidateItem) -> Result<String, TransformError> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": Self::user_prompt(item) },
                ],
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransformError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = resp.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(TransformError::EmptyResponse)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transformer(server: &MockServer) -> OpenAiTransformer {
        let config = TransformerConfig {
            api_base: format!("{}/v1/", server.uri()),
            ..TransformerConfig::default()
        };
        OpenAiTransformer::new(&config, "sk-test", Duration::from_secs(5)).unwrap()
    }

    fn item() -> CandidateItem {
        CandidateItem::new("Title", "Summary", "https://example.com/1")
    }

    #[tokio::test]
    async fn rewrite_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({ "max_tokens": 500, "model": "gpt-3.5-turbo" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "  Rewritten post.  " } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = transformer(&server).rewrite(&item()).await.unwrap();
        assert_eq!(text, "Rewritten post.");
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = transformer(&server).rewrite(&item()).await.unwrap_err();
        assert!(matches!(err, TransformError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn no_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = transformer(&server).rewrite(&item()).await.unwrap_err();
        assert!(matches!(err, TransformError::EmptyResponse));
    }
}
