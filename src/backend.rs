use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;

use crate::{anthropic, gemini, openai};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 1.0,
        }
    }
}

/// A text-generation service.
///
/// Providers must implement `generate`. Providers without native streaming get
/// `stream_generate` for free: the whole reply is delivered as one fragment.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> anyhow::Result<String>;

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        on_fragment: &mut (dyn for<'f> FnMut(&'f str) + Send),
    ) -> anyhow::Result<String> {
        let text = self.generate(prompt, options).await?;
        on_fragment(&text);
        Ok(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Anthropic,
    Openai,
    Gemini,
    Openrouter,
    Groq,
    Custom,
    Mock,
    /// No backend at all; every stage uses its built-in fallback.
    Offline,
}

/// Builds the backend for `provider`.
///
/// Returns `None` only for [`Provider::Offline`]. A provider that cannot be
/// initialized (missing key, bad base URL) degrades to [`MockBackend`].
pub fn create_backend(
    provider: Provider,
    api_key: Option<String>,
    model: Option<String>,
) -> Option<Box<dyn Backend>> {
    let built: anyhow::Result<Box<dyn Backend>> = match provider {
        Provider::Offline => return None,
        Provider::Mock => return Some(Box::new(MockBackend)),
        Provider::Anthropic => {
            anthropic::AnthropicBackend::from_env(api_key, model).map(|b| Box::new(b) as Box<dyn Backend>)
        }
        Provider::Gemini => {
            gemini::GeminiBackend::from_env(api_key, model).map(|b| Box::new(b) as Box<dyn Backend>)
        }
        Provider::Openai | Provider::Openrouter | Provider::Groq | Provider::Custom => {
            openai::OpenAiBackend::from_env(provider, api_key, model).map(|b| Box::new(b) as Box<dyn Backend>)
        }
    };

    match built {
        Ok(backend) => {
            tracing::info!(provider = backend.name(), "backend initialized");
            Some(backend)
        }
        Err(err) => {
            tracing::warn!(
                ?provider,
                error = %format!("{err:#}"),
                "could not initialize backend; falling back to mock backend"
            );
            Some(Box::new(MockBackend))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub retries: usize,
    pub retry_delay: Duration,
}

impl HttpSettings {
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("EBOOKGEN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(300);
        let retries = std::env::var("EBOOKGEN_RETRIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        Self {
            timeout: Duration::from_secs(timeout_secs.max(1)),
            retries,
            retry_delay: Duration::from_secs(2),
        }
    }

    pub fn client(&self) -> anyhow::Result<reqwest::Client> {
        use anyhow::Context as _;

        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("build http client")
    }
}

pub(crate) async fn call_with_retry<F, Fut, T>(settings: &HttpSettings, mut call: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = settings.retries.saturating_add(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    attempts,
                    error = %format!("{err:#}"),
                    "backend call failed; retrying"
                );
                tokio::time::sleep(settings.retry_delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err.context(format!("backend call failed after {attempt} attempt(s)"))),
        }
    }
}

/// Wraps a caller's sink and remembers whether anything reached it, so a
/// stream that dies before its first fragment can be retried without streaming.
pub(crate) struct TrackedSink<'a> {
    inner: &'a mut (dyn for<'f> FnMut(&'f str) + Send),
    pub emitted: bool,
}

impl<'a> TrackedSink<'a> {
    pub(crate) fn new(inner: &'a mut (dyn for<'f> FnMut(&'f str) + Send)) -> Self {
        Self {
            inner,
            emitted: false,
        }
    }

    pub(crate) fn emit(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.emitted = true;
        (self.inner)(fragment);
    }
}

/// Deterministic offline backend with canned, prompt-sensitive replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBackend;

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> anyhow::Result<String> {
        mock_reply(prompt)
    }
}

fn mock_reply(prompt: &str) -> anyhow::Result<String> {
    if let Some(rest) = prompt.split("Given Topic:").nth(1) {
        let topic = rest.lines().next().unwrap_or_default().trim();
        let topic = if topic.is_empty() { "wellness" } else { topic };
        let keyword = topic.split_whitespace().next().unwrap_or("wellness");
        return Ok(format!("```yaml\n{}```", mock_config_yaml(topic, keyword)?));
    }

    if prompt.contains("search queries") {
        return Ok("weight loss\n\
weight loss tips\n\
how to lose weight\n\
weight loss diet\n\
weight loss for beginners"
            .to_owned());
    }

    if prompt.contains("eBook outline") {
        return Ok("# Transform Your Body: The Science of Sustainable Weight Loss\n\
\n\
## Core Transformation Summary\n\
This book guides busy professionals through evidence-based strategies that fit into hectic schedules.\n\
\n\
## Chapter 1 – Understanding Your Metabolism\n\
Goal: Learn how your body processes food and burns calories.\n\
\n\
## Chapter 2 – Nutrition Fundamentals\n\
Goal: Master the basics of macronutrients and meal planning.\n\
\n\
## Chapter 3 – Exercise Essentials\n\
Goal: Design a workout routine that fits your lifestyle.\n\
\n\
## Chapter 4 – Building Lasting Habits\n\
Goal: Create sustainable behaviors for long-term success.\n\
\n\
## Chapter 5 – Overcoming Plateaus\n\
Goal: Navigate challenges and maintain momentum.\n\
\n\
## Final Thoughts\n\
Goal: Embrace your transformation journey with confidence.\n"
            .to_owned());
    }

    let head = prompt.chars().take(100).collect::<String>();
    Ok(format!("Mock response for: {head}..."))
}

fn mock_config_yaml(topic: &str, keyword: &str) -> anyhow::Result<String> {
    use anyhow::Context as _;
    use serde_yaml::{Mapping, Value};

    let mut block = Mapping::new();
    let mut put = |key: &str, value: Value| {
        block.insert(Value::from(key), value);
    };
    put("topic", Value::from(topic));
    put("main_keyword", Value::from(keyword));
    put("theme", Value::from("science-backed transformation"));
    put("target_audience", Value::from("busy professionals aged 30-50"));
    put("tone", Value::from("empowering"));
    put("mood", Value::from("motivational"));
    put("distribution_platform", Value::from("Amazon KDP"));
    put("primary_format", Value::from("Kindle"));
    put("chapter_length", Value::from(2000));
    put(
        "interactive_elements_included",
        Value::from("Printable Tracker, Progress Checklist, Habit Worksheet"),
    );
    serde_yaml::to_string(&block).context("serialize mock config block")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneShot(&'static str);

    #[async_trait]
    impl Backend for OneShot {
        fn name(&self) -> &str {
            "one-shot"
        }

        async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> anyhow::Result<String> {
            Ok(self.0.to_owned())
        }
    }

    #[tokio::test]
    async fn default_stream_delivers_whole_text_as_one_fragment() -> anyhow::Result<()> {
        let backend = OneShot("hello world");
        let mut fragments = Vec::new();
        let text = backend
            .stream_generate("prompt", &GenerateOptions::default(), &mut |f: &str| {
                fragments.push(f.to_owned())
            })
            .await?;
        assert_eq!(text, "hello world");
        assert_eq!(fragments, vec!["hello world".to_owned()]);
        Ok(())
    }

    #[test]
    fn offline_provider_has_no_backend() {
        assert!(create_backend(Provider::Offline, None, None).is_none());
    }

    #[test]
    fn mock_reply_builds_config_block_from_topic() -> anyhow::Result<()> {
        let reply = mock_reply("Analyze this.\n\nGiven Topic: sleep hygiene\n\nMore text")?;
        assert!(reply.starts_with("```yaml\n"));
        assert!(reply.ends_with("\n```"));
        assert!(reply.contains("topic: sleep hygiene\n"));
        assert!(reply.contains("main_keyword: sleep\n"));
        Ok(())
    }

    #[test]
    fn mock_config_block_survives_quotes_and_backslashes() -> anyhow::Result<()> {
        let topic = r#"the "keto" diet \ fasting"#;
        let reply = mock_reply(&format!("Given Topic: {topic}\n"))?;
        let yaml = reply
            .trim_start_matches("```yaml\n")
            .trim_end_matches("```");
        let parsed: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        assert_eq!(parsed["topic"].as_str(), Some(topic));
        assert_eq!(parsed["main_keyword"].as_str(), Some("the"));
        assert_eq!(parsed["chapter_length"].as_u64(), Some(2000));
        Ok(())
    }

    #[test]
    fn mock_reply_echoes_unknown_prompts() -> anyhow::Result<()> {
        let reply = mock_reply("Write Chapter 1 titled 'X'")?;
        assert_eq!(reply, "Mock response for: Write Chapter 1 titled 'X'...");
        Ok(())
    }

    #[tokio::test]
    async fn retry_gives_up_after_configured_attempts() {
        let settings = HttpSettings {
            timeout: Duration::from_secs(1),
            retries: 2,
            retry_delay: Duration::from_millis(1),
        };
        let mut calls = 0;
        let result: anyhow::Result<()> = call_with_retry(&settings, || {
            calls += 1;
            async { anyhow::bail!("boom") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
