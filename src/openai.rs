use anyhow::Context as _;
use async_trait::async_trait;

use crate::backend::{
    Backend, GenerateOptions, HttpSettings, Provider, TrackedSink, call_with_retry,
};
use crate::sse::SseDecoder;

/// OpenAI-compatible chat-completions backend (OpenAI, OpenRouter, Groq, custom endpoints).
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    name: &'static str,
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    settings: HttpSettings,
}

impl OpenAiBackend {
    pub fn from_env(
        provider: Provider,
        api_key: Option<String>,
        model: Option<String>,
    ) -> anyhow::Result<Self> {
        let (name, key_var, base_url, default_model) = match provider {
            Provider::Openai => (
                "openai",
                "OPENAI_API_KEY",
                std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_owned()),
                "gpt-4-turbo".to_owned(),
            ),
            Provider::Openrouter => (
                "openrouter",
                "OPENROUTER_API_KEY",
                "https://openrouter.ai/api/v1".to_owned(),
                "gpt-4o-mini".to_owned(),
            ),
            Provider::Groq => (
                "groq",
                "GROQ_API_KEY",
                "https://api.groq.com/openai/v1".to_owned(),
                "llama-3.1-70b-versatile".to_owned(),
            ),
            Provider::Custom => (
                "custom",
                "CUSTOM_LLM_API_KEY",
                std::env::var("CUSTOM_LLM_BASE_URL")
                    .map_err(|_| anyhow::anyhow!("CUSTOM_LLM_BASE_URL is not set"))?,
                std::env::var("CUSTOM_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_owned()),
            ),
            other => anyhow::bail!("{other:?} is not an OpenAI-compatible provider"),
        };

        let api_key = match api_key {
            Some(key) => key,
            None => std::env::var(key_var).map_err(|_| anyhow::anyhow!("{key_var} is not set"))?,
        };
        if api_key.trim().is_empty() {
            anyhow::bail!("{key_var} is empty");
        }

        url::Url::parse(&base_url).with_context(|| format!("parse base url: {base_url}"))?;

        let settings = HttpSettings::from_env();
        Ok(Self {
            name,
            client: settings.client()?,
            endpoint: chat_completions_endpoint(&base_url),
            api_key,
            model: model.unwrap_or(default_model),
            settings,
        })
    }

    fn request_body(&self, prompt: &str, options: &GenerateOptions, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "stream": stream,
        })
    }

    async fn chat(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String> {
        let body = self.request_body(prompt, options, false);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read chat completion body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("{} API error ({status}): {message}", self.name);
        }

        let value: serde_json::Value =
            serde_json::from_str(&raw).context("parse chat completion")?;
        extract_message_text(&value).context("extract message text")
    }

    async fn chat_stream(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        sink: &mut TrackedSink<'_>,
    ) -> anyhow::Result<String> {
        let body = self.request_body(prompt, options, true);
        let mut response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} (stream)", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = parse_error_message(&raw).unwrap_or(raw);
            anyhow::bail!("{} API error ({status}): {message}", self.name);
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
                if data.trim() == "[DONE]" {
                    done = true;
                    break;
                }
                let value: serde_json::Value =
                    serde_json::from_str(&data).context("parse stream event")?;
                if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
                    anyhow::bail!("{} stream error: {message}", self.name);
                }
                if let Some(delta) = value
                    .pointer("/choices/0/delta/content")
                    .and_then(|v| v.as_str())
                {
                    full.push_str(delta);
                    sink.emit(delta);
                }
            }
        }

        Ok(full)
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String> {
        call_with_retry(&self.settings, || self.chat(prompt, options)).await
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        on_fragment: &mut (dyn for<'f> FnMut(&'f str) + Send),
    ) -> anyhow::Result<String> {
        let mut sink = TrackedSink::new(on_fragment);
        let streamed = self.chat_stream(prompt, options, &mut sink).await;
        match streamed {
            Ok(text) => Ok(text),
            Err(err) if !sink.emitted => {
                tracing::warn!(
                    provider = self.name,
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

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

pub(crate) fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_message_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let choices = value
        .get("choices")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `choices` array in response"))?;

    let text = choices
        .first()
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing `message.content` in first choice"))?;

    Ok(text.to_owned())
}
