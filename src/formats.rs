use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const MIN_SEARCH_RESULTS: u64 = 12_000_000;
pub const DEFAULT_NUM_CHAPTERS: u32 = 5;

/// Parameters that drive every stage of a run. Persisted as `config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookConfig {
    pub topic: String,
    pub main_keyword: String,
    pub theme: String,
    pub target_audience: String,
    pub tone: String,
    pub mood: String,
    pub distribution_platform: String,
    pub primary_format: String,
    pub chapter_length: u32,
    pub interactive_elements_included: String,
    #[serde(default = "default_min_search_results")]
    pub min_search_results: u64,
    #[serde(default = "default_num_chapters")]
    pub num_chapters: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro_min_words: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro_max_words: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_min_words: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_max_words: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_min_words: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_max_words: Option<u32>,
}

fn default_min_search_results() -> u64 {
    MIN_SEARCH_RESULTS
}

fn default_num_chapters() -> u32 {
    DEFAULT_NUM_CHAPTERS
}

impl BookConfig {
    pub fn intro_words(&self) -> Option<(u32, u32)> {
        self.intro_min_words.zip(self.intro_max_words)
    }

    pub fn final_words(&self) -> Option<(u32, u32)> {
        self.final_min_words.zip(self.final_max_words)
    }

    pub fn review_words(&self) -> Option<(u32, u32)> {
        self.review_min_words.zip(self.review_max_words)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.topic.trim().is_empty() {
            anyhow::bail!("config topic is empty");
        }
        if self.chapter_length == 0 {
            anyhow::bail!("config chapter_length must be > 0");
        }
        if self.num_chapters == 0 {
            anyhow::bail!("config num_chapters must be > 0");
        }
        for (name, range) in [
            ("intro", self.intro_words()),
            ("final", self.final_words()),
            ("review", self.review_words()),
        ] {
            if let Some((min, max)) = range
                && min > max
            {
                anyhow::bail!("config {name}_min_words ({min}) exceeds {name}_max_words ({max})");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub chapter: usize,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// Image-generation prompt attached to one chapter (diagrams, backgrounds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrompt {
    pub chapter: usize,
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResults {
    pub queries: Vec<String>,
    pub outline: String,
    pub toc: String,
    pub chapters: Vec<String>,
    pub optimized_chapters: Vec<String>,
    pub cover_prompt: String,
    pub interactive_elements: Vec<InteractiveElement>,
    pub diagram_prompts: Vec<ImagePrompt>,
    pub background_prompts: Vec<ImagePrompt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub timestamp: String,
    pub run_id: String,
    pub config: BookConfig,
    pub output_files: BTreeMap<String, String>,
}
