use crate::cli::TemplateName;
use crate::formats::BookConfig;

/// Structural targets for one book template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateSpec {
    pub intro_words: (u32, u32),
    pub num_chapters: u32,
    pub chapter_length: u32,
    pub final_words: (u32, u32),
    pub review_words: (u32, u32),
}

pub fn template_spec(name: TemplateName) -> TemplateSpec {
    match name {
        TemplateName::Standard => TemplateSpec {
            intro_words: (600, 900),
            num_chapters: 5,
            chapter_length: 1200,
            final_words: (600, 900),
            review_words: (300, 500),
        },
        TemplateName::Quickstart => TemplateSpec {
            intro_words: (300, 500),
            num_chapters: 3,
            chapter_length: 800,
            final_words: (300, 500),
            review_words: (150, 250),
        },
        TemplateName::Deepdive => TemplateSpec {
            intro_words: (800, 1200),
            num_chapters: 8,
            chapter_length: 2000,
            final_words: (800, 1200),
            review_words: (400, 700),
        },
    }
}

pub fn apply_template(mut config: BookConfig, name: TemplateName) -> BookConfig {
    let spec = template_spec(name);
    config.intro_min_words = Some(spec.intro_words.0);
    config.intro_max_words = Some(spec.intro_words.1);
    config.num_chapters = spec.num_chapters;
    config.chapter_length = spec.chapter_length;
    config.final_min_words = Some(spec.final_words.0);
    config.final_max_words = Some(spec.final_words.1);
    config.review_min_words = Some(spec.review_words.0);
    config.review_max_words = Some(spec.review_words.1);
    config
}

/// Applies a template by name; unknown names leave `config` untouched.
pub fn apply_template_by_name(config: BookConfig, name: &str) -> BookConfig {
    match parse_template_name(name) {
        Some(template) => apply_template(config, template),
        None => {
            tracing::warn!(template = name, "unknown template; configuration left unchanged");
            config
        }
    }
}

pub fn parse_template_name(name: &str) -> Option<TemplateName> {
    match name.trim().to_ascii_lowercase().as_str() {
        "standard" => Some(TemplateName::Standard),
        "quickstart" => Some(TemplateName::Quickstart),
        "deepdive" => Some(TemplateName::Deepdive),
        _ => None,
    }
}

/// One-line menu description, e.g. `Intro 600-900, 5 chapters @ 1200, ...`.
pub fn describe(name: TemplateName) -> String {
    let spec = template_spec(name);
    format!(
        "Intro {}-{}, {} chapters @ {}, Final {}-{}, Review {}-{}",
        spec.intro_words.0,
        spec.intro_words.1,
        spec.num_chapters,
        spec.chapter_length,
        spec.final_words.0,
        spec.final_words.1,
        spec.review_words.0,
        spec.review_words.1,
    )
}
