use anyhow::Context as _;
use async_trait::async_trait;

use crate::backend::{Backend, GenerateOptions, HttpSettings, TrackedSink, call_with_retry};
use crate::openai::parse_error_message;
use crate::sse::SseDecoder;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    settings: HttpSettings,
}

impl AnthropicBackend {
    pub fn from_env(api_key: Option<String>, model: Option<String>) -> anyhow::Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => std::env::var("ANTHROPIC_API_KEY")
                .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY is not set"))?,
        };
        if api_key.trim().is_empty() {
            anyhow::bail!("ANTHROPIC_API_KEY is empty");
        }
        let base_url = std::env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_owned());
        url::Url::parse(&base_url).with_context(|| format!("parse base url: {base_url}"))?;

        let settings = HttpSettings::from_env();
        Ok(Self {
            client: settings.client()?,
            endpoint: format!("{}/messages", base_url.trim_end_matches('/')),
            api_key,
            model: model.unwrap_or_else(|| "claude-sonnet-4-5".to_owned()),
            settings,
        })
    }

    fn request(&self, prompt: &str, options: &GenerateOptions, stream: bool) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        });
        self.client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
    }

    async fn message(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String> {
        let response = self
            .request(prompt, options, false)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read Anthropic response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("Anthropic API error ({status}): {message}");
        }

        let value: serde_json::Value = serde_json::from_str(&raw).context("parse Anthropic response")?;
        extract_content_text(&value)
    }

    async fn message_stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        sink: &mut TrackedSink<'_>,
    ) -> anyhow::Result<String> {
        let mut response = self
            .request(prompt, options, true)
            .send()
            .await
            .with_context(|| format!("POST {} (stream)", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = parse_error_message(&raw).unwrap_or(raw);
            anyhow::bail!("Anthropic API error ({status}): {message}");
        }

        let mut decoder = SseDecoder::new();
        let mut full = String::new();
        let mut done = false;
        while !done {
            let events = match response.chunk().await.context("read stream chunk")? {
                Some(bytes) => decoder.push(&bytes),
                None => {
                    done = true;
                    decoder.finish()
                }
            };
            for data in events {
                let value: serde_json::Value =
                    serde_json::from_str(&data).context("parse stream event")?;
                match value.get("type").and_then(|v| v.as_str()) {
                    Some("content_block_delta") => {
                        if let Some(text) = value.pointer("/delta/text").and_then(|v| v.as_str()) {
                            full.push_str(text);
                            sink.emit(text);
                        }
                    }
                    Some("message_stop") => done = true,
                    Some("error") => {
                        let message = value
                            .pointer("/error/message")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown error");
                        anyhow::bail!("Anthropic stream error: {message}");
                    }
                    _ => {}
                }
            }
        }

        Ok(full)
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String> {
        call_with_retry(&self.settings, || self.message(prompt, options)).await
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        on_fragment: &mut (dyn for<'f> FnMut(&'f str) + Send),
    ) -> anyhow::Result<String> {
        let mut sink = TrackedSink::new(on_fragment);
        let streamed = self.message_stream(prompt, options, &mut sink).await;
        match streamed {
            Ok(text) => Ok(text),
            Err(err) if !sink.emitted => {
                tracing::warn!(
                    provider = "anthropic",
                    error = %format!("{err:#}"),
                    "streaming failed; retrying without streaming"
                );
                let text = self.generate(prompt, options).await?;
                sink.emit(&text);
                Ok(text)
            }
            Err(err) => Err(err),
        }
    }
}

fn extract_content_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let content = value
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `content` array in response"))?;

    let mut text = String::new();
    for block in content {
        if block.get("type").and_then(|v| v.as_str()) != Some("text") {
            continue;
        }
        if let Some(part) = block.get("text").and_then(|v| v.as_str()) {
            text.push_str(part);
        }
    }
    Ok(text)
}
