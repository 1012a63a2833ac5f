use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::backend::{Backend, GenerateOptions};
use crate::compile::{self, EBOOK_FILE, title_case};
use crate::formats::{BookConfig, GenerationMetadata, ImagePrompt, InteractiveElement, StageResults};
use crate::outline::extract_chapter_titles;
use crate::progress::Progress;
use crate::store::ArtifactStore;

pub const QUERIES_FILE: &str = "stage_1_queries.txt";
pub const OUTLINE_FILE: &str = "stage_2_outline.md";
pub const TOC_FILE: &str = "stage_3_toc.md";
pub const COVER_PROMPT_FILE: &str = "stage_6_cover_prompt.txt";
pub const INTERACTIVE_FILE: &str = "stage_7_interactive_elements.json";
pub const DIAGRAMS_FILE: &str = "stage_8_diagram_prompts.json";
pub const BACKGROUNDS_FILE: &str = "stage_9_background_prompts.json";
pub const METADATA_FILE: &str = "generation_metadata.json";

const QUERY_COUNT: usize = 5;
const EMPTY_TOC: &str = "# Table of Contents\n\n(Outline parsing found no chapters)\n";

pub fn chapter_file(index: usize) -> String {
    format!("stage_4_chapter_{index}.md")
}

pub fn optimized_chapter_file(index: usize) -> String {
    format!("stage_5_optimized_chapter_{index}.md")
}

/// Deletes numbered chapter files past `count` left by an earlier, longer run
/// into the same directory.
fn remove_stale_chapters(store: &ArtifactStore, count: usize) -> anyhow::Result<()> {
    for index in count + 1.. {
        let draft = store.remove(&chapter_file(index))?;
        let optimized = store.remove(&optimized_chapter_file(index))?;
        if !draft && !optimized {
            break;
        }
        tracing::debug!(index, "removed stale chapter files");
    }
    Ok(())
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub results: StageResults,
    pub ebook_path: PathBuf,
    pub metadata_path: PathBuf,
    pub run_id: String,
}

/// Runs stages 1 through 9 in order, then compiles the eBook and writes the
/// run metadata. Each stage's artifacts are on disk before the next stage
/// starts. Only storage failures abort the run; backend failures inside a
/// stage fall back to that stage's offline output.
pub async fn execute(
    config: &BookConfig,
    store: &ArtifactStore,
    backend: Option<&dyn Backend>,
    progress: &dyn Progress,
) -> anyhow::Result<PipelineOutput> {
    let run_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(%run_id, out = %store.dir().display(), topic = %config.topic, "pipeline: start");
    progress.header("Starting eBook Generation Pipeline");

    let mut results = StageResults::default();

    tracing::info!(stage = 1, "pipeline: seo queries");
    progress.stage(1, "SEO Query Generation");
    results.queries = seo_queries(config, backend, progress).await;
    store.write_text(QUERIES_FILE, &results.queries.join("\n"))?;
    progress.success(&format!("Generated {} SEO queries", results.queries.len()));

    tracing::info!(stage = 2, "pipeline: outline");
    progress.stage(2, "eBook Outline Generation");
    results.outline = outline(config, &results.queries, backend, progress).await;
    store.write_text(OUTLINE_FILE, &results.outline)?;
    progress.success("eBook outline created");

    tracing::info!(stage = 3, "pipeline: table of contents");
    progress.stage(3, "Table of Contents Generation");
    results.toc = table_of_contents(&results.outline);
    store.write_text(TOC_FILE, &results.toc)?;
    progress.success("Table of Contents generated");

    tracing::info!(stage = 4, "pipeline: chapters");
    progress.stage(4, "Chapter Content Writing");
    results.chapters = chapters(config, store, &results.outline, backend, progress).await?;
    for (index, chapter) in results.chapters.iter().enumerate() {
        store.write_text(&chapter_file(index + 1), chapter)?;
    }
    remove_stale_chapters(store, results.chapters.len())?;
    progress.success(&format!("Generated {} chapters", results.chapters.len()));

    tracing::info!(stage = 5, "pipeline: optimize");
    progress.stage(5, "Content Optimization");
    results.optimized_chapters = optimize_chapters(&results.chapters);
    for (index, chapter) in results.optimized_chapters.iter().enumerate() {
        store.write_text(&optimized_chapter_file(index + 1), chapter)?;
    }
    progress.success(&format!("Optimized {} chapters", results.optimized_chapters.len()));

    tracing::info!(stage = 6, "pipeline: cover prompt");
    progress.stage(6, "eBook Cover Design Prompt Generation");
    results.cover_prompt = cover_prompt(config);
    store.write_text(COVER_PROMPT_FILE, &results.cover_prompt)?;
    progress.success("Cover design prompt generated");

    tracing::info!(stage = 7, "pipeline: interactive elements");
    progress.stage(7, "Interactive Element Creation");
    results.interactive_elements = interactive_elements(&results.optimized_chapters);
    store.write_json(INTERACTIVE_FILE, &results.interactive_elements)?;
    progress.success(&format!(
        "Created {} interactive elements",
        results.interactive_elements.len()
    ));

    tracing::info!(stage = 8, "pipeline: diagram prompts");
    progress.stage(8, "Diagram Prompt Generation");
    results.diagram_prompts = diagram_prompts(&results.optimized_chapters);
    store.write_json(DIAGRAMS_FILE, &results.diagram_prompts)?;
    progress.success(&format!("Generated {} diagram prompts", results.diagram_prompts.len()));

    tracing::info!(stage = 9, "pipeline: background prompts");
    progress.stage(9, "Background Visual Prompt Generation");
    results.background_prompts = background_prompts(&results.optimized_chapters);
    store.write_json(BACKGROUNDS_FILE, &results.background_prompts)?;
    progress.success(&format!(
        "Generated {} background prompts",
        results.background_prompts.len()
    ));

    tracing::info!("pipeline: compile");
    progress.stage(10, "Final eBook Compilation");
    let ebook_path = compile::compile(config, &results, store, backend, progress).await?;
    progress.success(&format!("Production-ready eBook compiled: {}", ebook_path.display()));

    let metadata = GenerationMetadata {
        timestamp: chrono::Utc::now().to_rfc3339(),
        run_id: run_id.clone(),
        config: config.clone(),
        output_files: BTreeMap::from([
            ("ebook".to_owned(), ebook_path.display().to_string()),
            ("cover_prompt".to_owned(), COVER_PROMPT_FILE.to_owned()),
            ("diagram_prompts".to_owned(), DIAGRAMS_FILE.to_owned()),
            ("background_prompts".to_owned(), BACKGROUNDS_FILE.to_owned()),
            ("interactive_elements".to_owned(), INTERACTIVE_FILE.to_owned()),
        ]),
    };
    let metadata_path = store.write_json(METADATA_FILE, &metadata)?;
    tracing::info!(%run_id, ebook = EBOOK_FILE, "pipeline: done");

    Ok(PipelineOutput {
        results,
        ebook_path,
        metadata_path,
        run_id,
    })
}

/// Streams `prompt` to the progress sink and returns the whole reply.
async fn stream_to_progress(
    backend: &dyn Backend,
    prompt: &str,
    progress: &dyn Progress,
) -> anyhow::Result<String> {
    let mut sink = |fragment: &str| progress.fragment(fragment);
    let streamed = backend
        .stream_generate(prompt, &GenerateOptions::default(), &mut sink)
        .await;
    progress.stream_end();
    streamed
}

fn degrade(stage: u32, progress: &dyn Progress, err: &anyhow::Error) {
    tracing::warn!(stage, error = %format!("{err:#}"), "backend call failed; using fallback output");
    progress.warning(&format!("Backend call failed ({err:#}); using fallback output"));
}

/// Stage 1. At most five queries; short replies are not padded.
pub async fn seo_queries(
    config: &BookConfig,
    backend: Option<&dyn Backend>,
    progress: &dyn Progress,
) -> Vec<String> {
    let Some(backend) = backend else {
        return fallback_queries(&config.main_keyword);
    };

    progress.info("Streaming SEO query generation (live)...");
    match stream_to_progress(backend, &seo_prompt(config), progress).await {
        Ok(reply) => reply
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(QUERY_COUNT)
            .map(str::to_owned)
            .collect(),
        Err(err) => {
            degrade(1, progress, &err);
            fallback_queries(&config.main_keyword)
        }
    }
}

fn fallback_queries(keyword: &str) -> Vec<String> {
    vec![
        keyword.to_owned(),
        format!("{keyword} guide"),
        format!("{keyword} tips"),
        format!("how to {keyword}"),
        format!("{keyword} for beginners"),
    ]
}

fn seo_prompt(config: &BookConfig) -> String {
    format!(
        "You are an SEO strategist and trend analyst for the health, wellness and fitness niche.\n\
Provide exactly {QUERY_COUNT} short, high-volume search queries (1 to 4 keywords each) that users actually type into Google, YouTube or Reddit.\n\
Each query should reliably return more than {min} results. No special characters, dates or brand names.\n\
\n\
Topic: {topic}\n\
Tone: {tone}\n\
Mood: {mood}\n\
Theme: {theme}\n\
Main Keyword: {keyword}\n\
Target Audience: {audience}\n\
\n\
List only the queries, one per line, without explanations or extra text.",
        min = config.min_search_results,
        topic = config.topic,
        tone = config.tone,
        mood = config.mood,
        theme = config.theme,
        keyword = config.main_keyword,
        audience = config.target_audience,
    )
}

/// Stage 2.
pub async fn outline(
    config: &BookConfig,
    queries: &[String],
    backend: Option<&dyn Backend>,
    progress: &dyn Progress,
) -> String {
    let Some(backend) = backend else {
        return fallback_outline(config);
    };

    progress.info("Streaming outline generation (live)...");
    match stream_to_progress(backend, &outline_prompt(config, queries), progress).await {
        Ok(text) => text,
        Err(err) => {
            degrade(2, progress, &err);
            fallback_outline(config)
        }
    }
}

fn fallback_outline(config: &BookConfig) -> String {
    let title = title_case(&config.topic);
    let mut text = format!("# {title}\n\n## Outline\n\n");
    for index in 1..=config.num_chapters {
        text.push_str(&format!("- Chapter {index} - {title}: Part {index}\n"));
    }
    text
}

fn outline_prompt(config: &BookConfig, queries: &[String]) -> String {
    format!(
        "Generate eBook outline for: {topic}\n\
\n\
Audience: {audience}\n\
Theme: {theme}\n\
Tone: {tone}\n\
Target keywords:\n{keywords}\n\
\n\
Start with a one-line book title as `# Title` and a short transformation summary.\n\
Then list exactly {chapters} chapters, each on its own line as `## Chapter N – Title`, followed by a one-line goal.\n",
        topic = config.topic,
        audience = config.target_audience,
        theme = config.theme,
        tone = config.tone,
        keywords = queries
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n"),
        chapters = config.num_chapters,
    )
}

/// Stage 3. A numbered list of the outline's chapter titles.
pub fn table_of_contents(outline: &str) -> String {
    let titles = extract_chapter_titles(outline);
    if titles.is_empty() {
        tracing::warn!("outline has no recognizable chapter lines");
        return EMPTY_TOC.to_owned();
    }

    let mut toc = String::from("# Table of Contents\n\n");
    for (index, title) in titles.iter().enumerate() {
        toc.push_str(&format!("{}. {title}\n", index + 1));
    }
    toc
}

/// Stage 4.
///
/// Titles are derived from the outline as persisted in `store`, so an edited
/// `stage_2_outline.md` steers the chapters; `outline` is only used when that
/// file is missing. With no extractable titles, `num_chapters` placeholders
/// ("Chapter 1", ...) are written instead.
pub async fn chapters(
    config: &BookConfig,
    store: &ArtifactStore,
    outline: &str,
    backend: Option<&dyn Backend>,
    progress: &dyn Progress,
) -> anyhow::Result<Vec<String>> {
    let persisted = store.read_text(OUTLINE_FILE)?;
    let outline_text = persisted.as_deref().unwrap_or(outline);

    let mut titles = extract_chapter_titles(outline_text);
    if titles.is_empty() {
        tracing::warn!(
            num_chapters = config.num_chapters,
            "no chapter titles in outline; using numbered placeholders"
        );
        titles = (1..=config.num_chapters).map(|i| format!("Chapter {i}")).collect();
    }

    let mut chapters = Vec::with_capacity(titles.len());
    for (offset, title) in titles.iter().enumerate() {
        let index = offset + 1;
        let heading = format!("# Chapter {index}: {title}");

        let body = match backend {
            Some(backend) => {
                progress.info(&format!("Streaming Chapter {index} – {title} (live)..."));
                let prompt = chapter_prompt(config, index, title);
                match stream_to_progress(backend, &prompt, progress).await {
                    Ok(text) if text.trim().is_empty() => "(Empty)".to_owned(),
                    Ok(text) => text.trim().to_owned(),
                    Err(err) => {
                        tracing::warn!(chapter = index, "chapter generation failed");
                        degrade(4, progress, &err);
                        fallback_chapter_body(title)
                    }
                }
            }
            None => fallback_chapter_body(title),
        };

        chapters.push(format!("{heading}\n\n{body}"));
    }
    Ok(chapters)
}

fn chapter_prompt(config: &BookConfig, index: usize, title: &str) -> String {
    format!(
        "Write Chapter {index} titled '{title}' for the eBook on '{topic}'. \
Target length ~{length} words. Use clear subheadings and actionable takeaways.",
        topic = config.topic,
        length = config.chapter_length,
    )
}

fn fallback_chapter_body(title: &str) -> String {
    format!("Content for {title}...")
}

/// Stage 5. Count and order always match the input.
pub fn optimize_chapters(chapters: &[String]) -> Vec<String> {
    chapters.iter().map(|chapter| optimize_chapter(chapter)).collect()
}

// Rewriting pass per chapter; currently passes the text through.
fn optimize_chapter(chapter: &str) -> String {
    chapter.to_owned()
}

/// Stage 6.
pub fn cover_prompt(config: &BookConfig) -> String {
    format!(
        "Ultra-realistic, cinematic eBook cover for '{}', emotional and transformative visual metaphor, high-resolution, A4 format.",
        config.topic
    )
}

/// Stage 7. One printable tracker per chapter.
pub fn interactive_elements(chapters: &[String]) -> Vec<InteractiveElement> {
    (1..=chapters.len())
        .map(|chapter| InteractiveElement {
            chapter,
            title: format!("Progress Tracker - Chapter {chapter}"),
            kind: "Printable Tracker".to_owned(),
            description: "Track your progress".to_owned(),
        })
        .collect()
}

/// Stage 8.
pub fn diagram_prompts(chapters: &[String]) -> Vec<ImagePrompt> {
    per_chapter_prompts(
        chapters,
        "3D isometric diagram showing key concepts, calming pastel tones, high-resolution",
    )
}

/// Stage 9.
pub fn background_prompts(chapters: &[String]) -> Vec<ImagePrompt> {
    per_chapter_prompts(
        chapters,
        "Fitness transformation themed background, dynamic gradients, ultra-realistic",
    )
}

fn per_chapter_prompts(chapters: &[String], prompt: &str) -> Vec<ImagePrompt> {
    (1..=chapters.len())
        .map(|chapter| ImagePrompt {
            chapter,
            prompt: prompt.to_owned(),
        })
        .collect()
}
