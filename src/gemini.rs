use anyhow::Context as _;
use async_trait::async_trait;

use crate::backend::{Backend, GenerateOptions, HttpSettings, TrackedSink, call_with_retry};
use crate::openai::parse_error_message;
use crate::sse::SseDecoder;

/// Gemini `generateContent` backend. Streaming goes through
/// `streamGenerateContent?alt=sse`.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    settings: HttpSettings,
}

impl GeminiBackend {
    pub fn from_env(api_key: Option<String>, model: Option<String>) -> anyhow::Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => std::env::var("GOOGLE_API_KEY")
                .or_else(|_| std::env::var("GEMINI_API_KEY"))
                .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY or GEMINI_API_KEY is not set"))?,
        };
        if api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is empty");
        }

        let settings = HttpSettings::from_env();
        Ok(Self {
            client: settings.client()?,
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_owned()),
            api_key,
            model: model.unwrap_or_else(|| "gemini-1.5-pro".to_owned()),
            settings,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{method}", self.base_url, self.model)
    }

    fn request_body(prompt: &str, options: &GenerateOptions) -> serde_json::Value {
        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_tokens,
            },
        })
    }

    async fn generate_content(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String> {
        let endpoint = self.endpoint("generateContent");
        let body = Self::request_body(prompt, options);

        let response = self
            .client
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {endpoint}"))?;

        let status = response.status();
        let raw = response.text().await.context("read Gemini response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("Gemini API error ({status}): {message}");
        }

        let value: serde_json::Value = serde_json::from_str(&raw).context("parse Gemini response")?;
        extract_candidate_text(&value)
    }

    async fn stream_content(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        sink: &mut TrackedSink<'_>,
    ) -> anyhow::Result<String> {
        let endpoint = self.endpoint("streamGenerateContent");
        let body = Self::request_body(prompt, options);

        let mut response = self
            .client
            .post(&endpoint)
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {endpoint} (stream)"))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = parse_error_message(&raw).unwrap_or(raw);
            anyhow::bail!("Gemini API error ({status}): {message}");
        }

        let mut decoder = SseDecoder::new();
        let mut full = String::new();
        loop {
            let chunk = response.chunk().await.context("read stream chunk")?;
            let finished = chunk.is_none();
            let events = match chunk {
                Some(bytes) => decoder.push(&bytes),
                None => decoder.finish(),
            };
            for data in events {
                let value: serde_json::Value =
                    serde_json::from_str(&data).context("parse stream event")?;
                if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
                    anyhow::bail!("Gemini stream error: {message}");
                }
                // usage-only events carry no candidates
                if value.get("candidates").is_none() {
                    continue;
                }
                let text = extract_candidate_text(&value)?;
                full.push_str(&text);
                sink.emit(&text);
            }
            if finished {
                break;
            }
        }

        Ok(full)
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String> {
        call_with_retry(&self.settings, || self.generate_content(prompt, options)).await
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        on_fragment: &mut (dyn for<'f> FnMut(&'f str) + Send),
    ) -> anyhow::Result<String> {
        let mut sink = TrackedSink::new(on_fragment);
        match self.stream_content(prompt, options, &mut sink).await {
            Ok(text) => Ok(text),
            Err(err) if !sink.emitted => {
                tracing::warn!(
                    provider = "gemini",
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

fn extract_candidate_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `candidates[0].content.parts` in response"))?;

    Ok(parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|v| v.as_str()))
        .collect::<String>())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    /// Serves one canned response per request and reports each request URL.
    fn serve(
        replies: Vec<(u16, &'static str, String)>,
    ) -> (String, std::sync::mpsc::Receiver<String>, thread::JoinHandle<()>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start gemini stub");
        let base_url = format!("http://{}/v1beta", server.server_addr());
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            for (status, content_type, body) in replies {
                let Ok(mut request) = server.recv() else {
                    return;
                };
                let mut ignored = String::new();
                let _ = request.as_reader().read_to_string(&mut ignored);
                let _ = tx.send(request.url().to_owned());
                let header = tiny_http::Header::from_bytes("Content-Type", content_type)
                    .expect("build header");
                let _ = request.respond(
                    tiny_http::Response::from_string(body)
                        .with_status_code(status)
                        .with_header(header),
                );
            }
        });
        (base_url, rx, handle)
    }

    fn backend(base_url: &str) -> anyhow::Result<GeminiBackend> {
        Ok(GeminiBackend::from_env(Some("test-key".to_owned()), Some("stub".to_owned()))?
            .with_base_url(base_url))
    }

    #[tokio::test]
    async fn stream_generate_emits_each_sse_candidate() -> anyhow::Result<()> {
        let body = [
            r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"lo"},{"text":" there"}]}}]}"#,
            r#"{"usageMetadata":{"totalTokenCount":3}}"#,
        ]
        .iter()
        .map(|event| format!("data: {event}\r\n\r\n"))
        .collect::<String>();
        let (base_url, urls, handle) = serve(vec![(200, "text/event-stream", body)]);

        let mut fragments = Vec::new();
        let text = backend(&base_url)?
            .stream_generate("prompt", &GenerateOptions::default(), &mut |f: &str| {
                fragments.push(f.to_owned())
            })
            .await?;
        handle.join().expect("join gemini stub");

        assert_eq!(text, "Hello there");
        assert_eq!(fragments, vec!["Hel".to_owned(), "lo there".to_owned()]);
        let url = urls.recv()?;
        assert!(url.starts_with("/v1beta/models/stub:streamGenerateContent?"), "{url}");
        assert!(url.contains("alt=sse"), "{url}");
        Ok(())
    }

    #[tokio::test]
    async fn failed_stream_falls_back_to_generate_content() -> anyhow::Result<()> {
        let plain = r#"{"candidates":[{"content":{"parts":[{"text":"whole reply"}]}}]}"#;
        let (base_url, urls, handle) = serve(vec![
            (500, "application/json", r#"{"error":{"message":"overloaded"}}"#.to_owned()),
            (200, "application/json", plain.to_owned()),
        ]);

        let mut fragments = Vec::new();
        let text = backend(&base_url)?
            .stream_generate("prompt", &GenerateOptions::default(), &mut |f: &str| {
                fragments.push(f.to_owned())
            })
            .await?;
        handle.join().expect("join gemini stub");

        assert_eq!(text, "whole reply");
        assert_eq!(fragments, vec!["whole reply".to_owned()]);
        assert!(urls.recv()?.contains(":streamGenerateContent"));
        assert!(urls.recv()?.contains(":generateContent?"));
        Ok(())
    }

    #[test]
    fn candidate_parts_are_concatenated() -> anyhow::Result<()> {
        let value = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }, { "text": "b" }] } }]
        });
        assert_eq!(extract_candidate_text(&value)?, "ab");
        assert!(extract_candidate_text(&serde_json::json!({ "candidates": [] })).is_err());
        Ok(())
    }
}
