use anyhow::Context as _;

use crate::backend::{Backend, GenerateOptions};
use crate::formats::{BookConfig, DEFAULT_NUM_CHAPTERS, MIN_SEARCH_RESULTS};
use crate::progress::Progress;

const BEGINNER_WORDS: &[&str] = &["beginner", "start"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicTraits {
    pub beginner: bool,
}

pub fn classify_topic(topic: &str) -> TopicTraits {
    let lower = topic.to_lowercase();
    TopicTraits {
        beginner: BEGINNER_WORDS.iter().any(|w| lower.contains(w)),
    }
}

struct ThemeRule {
    applies: fn(&TopicTraits) -> bool,
    theme: &'static str,
}

/// First matching rule wins; the last rule always matches.
const THEME_RULES: &[ThemeRule] = &[
    ThemeRule {
        applies: is_beginner,
        theme: "beginner-friendly transformation",
    },
    ThemeRule {
        applies: always,
        theme: "science-backed sustainable change",
    },
];

fn is_beginner(traits: &TopicTraits) -> bool {
    traits.beginner
}

fn always(_: &TopicTraits) -> bool {
    true
}

fn select_theme(traits: &TopicTraits) -> &'static str {
    THEME_RULES
        .iter()
        .find(|rule| (rule.applies)(traits))
        .or(THEME_RULES.last())
        .map(|rule| rule.theme)
        .unwrap_or_default()
}

/// Configuration derived from the topic text alone.
pub fn heuristic_config(topic: &str) -> BookConfig {
    let traits = classify_topic(topic);
    tracing::debug!(beginner = traits.beginner, "classified topic");

    BookConfig {
        topic: topic.to_owned(),
        main_keyword: topic
            .split_whitespace()
            .next()
            .unwrap_or("wellness")
            .to_owned(),
        theme: select_theme(&traits).to_owned(),
        target_audience: "busy professionals aged 30-50 seeking practical solutions".to_owned(),
        tone: "empowering".to_owned(),
        mood: "motivational".to_owned(),
        distribution_platform: "Amazon KDP".to_owned(),
        primary_format: "Kindle".to_owned(),
        chapter_length: 2000,
        interactive_elements_included: "Printable Tracker, Progress Checklist, Habit Worksheet"
            .to_owned(),
        min_search_results: MIN_SEARCH_RESULTS,
        num_chapters: DEFAULT_NUM_CHAPTERS,
        intro_min_words: None,
        intro_max_words: None,
        final_min_words: None,
        final_max_words: None,
        review_min_words: None,
        review_max_words: None,
    }
}

#[derive(Debug, Clone)]
pub struct ConfigOutcome {
    pub config: BookConfig,
    /// Why the backend's reply was not used, when heuristics were substituted.
    pub fallback_reason: Option<String>,
}

/// Derives the run configuration for `topic`.
///
/// With a backend, its fenced YAML reply is used (missing keys are filled from
/// the heuristics). Any backend or parse failure falls back to the heuristics
/// and is reported through `fallback_reason`; this never fails.
pub async fn build_config(
    topic: &str,
    backend: Option<&dyn Backend>,
    progress: &dyn Progress,
) -> ConfigOutcome {
    progress.stage(0, "Auto-Generate Configuration Parameters");
    progress.info(&format!("Analyzing topic: '{topic}'"));

    let mut outcome = match backend {
        Some(backend) => {
            progress.info("Generating optimized configuration parameters...");
            match config_from_backend(topic, backend).await {
                Ok(config) => ConfigOutcome {
                    config,
                    fallback_reason: None,
                },
                Err(err) => {
                    let reason = format!("{err:#}");
                    tracing::warn!(error = %reason, "configuration reply unusable; using heuristic defaults");
                    progress.warning(&format!("Failed to parse backend response: {reason}"));
                    ConfigOutcome {
                        config: heuristic_config(topic),
                        fallback_reason: Some(reason),
                    }
                }
            }
        }
        None => ConfigOutcome {
            config: heuristic_config(topic),
            fallback_reason: None,
        },
    };

    outcome.config.min_search_results = MIN_SEARCH_RESULTS;
    outcome.config.num_chapters = DEFAULT_NUM_CHAPTERS;

    progress.success("Configuration generated successfully!");
    outcome
}

async fn config_from_backend(topic: &str, backend: &dyn Backend) -> anyhow::Result<BookConfig> {
    let reply = backend
        .generate(&config_prompt(topic), &GenerateOptions::default())
        .await
        .context("request configuration")?;
    parse_config_reply(topic, &reply)
}

pub fn parse_config_reply(topic: &str, reply: &str) -> anyhow::Result<BookConfig> {
    let block = extract_fenced_block(reply).unwrap_or(reply);
    let value: serde_yaml::Value = serde_yaml::from_str(block).context("parse YAML block")?;
    let serde_yaml::Value::Mapping(reply_map) = value else {
        anyhow::bail!("configuration reply is not a mapping");
    };

    let defaults = serde_yaml::to_value(heuristic_config(topic)).context("serialize defaults")?;
    let serde_yaml::Value::Mapping(mut merged) = defaults else {
        anyhow::bail!("default configuration is not a mapping");
    };
    for (key, value) in reply_map {
        if value.is_null() {
            continue;
        }
        merged.insert(key, value);
    }

    let config: BookConfig = serde_yaml::from_value(serde_yaml::Value::Mapping(merged))
        .context("configuration reply has invalid fields")?;
    if config.topic.trim().is_empty() {
        anyhow::bail!("configuration reply has an empty topic");
    }
    if config.chapter_length == 0 {
        anyhow::bail!("configuration reply has chapter_length 0");
    }
    Ok(config)
}

/// Returns the body of the first ```yaml (or ```yml) fence, else of the first fence of any kind.
pub fn extract_fenced_block(text: &str) -> Option<&str> {
    for tag in ["```yaml", "```yml"] {
        if let Some(start) = text.find(tag) {
            let rest = &text[start + tag.len()..];
            let end = rest.find("```").unwrap_or(rest.len());
            return Some(rest[..end].trim());
        }
    }

    let start = text.find("```")?;
    let rest = &text[start + 3..];
    let end = rest.find("```").unwrap_or(rest.len());
    let body = &rest[..end];
    // Drop an info string such as `json` or `toml` on the opening fence line.
    let body = match body.split_once('\n') {
        Some((first, remainder)) if !first.contains(':') => remainder,
        _ => body,
    };
    Some(body.trim())
}

fn config_prompt(topic: &str) -> String {
    format!(
        "You are an eBook strategist and market analyst.\n\
Analyze the topic below and produce configuration parameters for an automated eBook generation system.\n\
\n\
Given Topic: {topic}\n\
\n\
Output ONLY this YAML block, no commentary:\n\
\n\
```yaml\n\
topic: \"[refined, market-focused topic]\"\n\
main_keyword: \"[primary keyword with broad search demand]\"\n\
theme: \"[overarching theme or approach]\"\n\
target_audience: \"[demographic and psychographic profile]\"\n\
tone: \"[empowering/conversational/authoritative/inspiring/supportive/motivational]\"\n\
mood: \"[motivational/calming/energetic/supportive/uplifting/confident]\"\n\
distribution_platform: \"[Amazon KDP/Gumroad/Etsy/Self-hosted]\"\n\
primary_format: \"[PDF/EPUB/Kindle/Interactive PDF]\"\n\
chapter_length: [word count per chapter as an integer, 1500-2500]\n\
interactive_elements_included: \"[2-3 of: Printable Tracker, Guided Journal Page, Progress Checklist, Habit Worksheet, Milestone Calendar]\"\n\
```\n"
    )
}
