use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::instrument;

use super::http_curl::CurlAuth;
use super::http_curl::CurlClient;
use crate::generator::ChangeGenerator;
use crate::generator::ChatMessage;
use crate::generator::GenerationRequest;
use crate::generator::build_messages;

/// Settings of an Azure OpenAI chat deployment.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Generator backed by an Azure OpenAI chat-completions deployment.
pub struct OpenAiClient {
    settings: OpenAiSettings,
    http_client: CurlClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings, timeout: Duration) -> Self {
        let http_client = CurlClient::new(
            CurlAuth::Header {
                name: "api-key".to_string(),
                value: settings.api_key.clone(),
            },
            timeout,
        );
        Self {
            settings,
            http_client,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment,
            self.settings.api_version
        )
    }

    #[instrument(skip_all, fields(deployment = %self.settings.deployment))]
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::to_string(&ChatRequest {
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        })?;
        debug!("Sending {} bytes to the generator", body.len());
        let response = self.http_client.post_json(&self.completions_url(), &body).await?;
        extract_content(&response)
    }
}

impl ChangeGenerator for OpenAiClient {
    async fn propose_changes(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let messages = build_messages(request)?;
        self.chat(&messages).await
    }
}

fn extract_content(response: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(response).context("Failed to parse chat completion response")?;
    if let Some(error) = response.error {
        bail!("Generator returned an error: {}", error.message);
    }
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .context("Generator response has no message content")
}
