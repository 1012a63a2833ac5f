use std::path::PathBuf;

use crate::backend::{Backend, GenerateOptions, MockBackend};
use crate::formats::{BookConfig, StageResults};
use crate::progress::Progress;
use crate::store::ArtifactStore;

pub const EBOOK_FILE: &str = "FINAL_EBOOK.md";

const RULE: &str = "---\n\n";

/// Assembles the final document and writes it to [`EBOOK_FILE`].
///
/// Layout: title block, optional introduction, table of contents, the
/// optimized chapters separated by rules, optional final thoughts, optional
/// review request, then the interactive-tools appendix. An optional section
/// is written only when both of its word bounds are configured. Without a
/// backend the sections are generated by [`MockBackend`].
pub async fn compile(
    config: &BookConfig,
    results: &StageResults,
    store: &ArtifactStore,
    backend: Option<&dyn Backend>,
    progress: &dyn Progress,
) -> anyhow::Result<PathBuf> {
    let backend: &dyn Backend = backend.unwrap_or(&MockBackend);
    let topic = &config.topic;

    let mut doc = String::new();
    doc.push_str(&format!("# {}\n\n", title_case(topic)));
    doc.push_str(&format!("*An eBook for {}*\n\n", config.target_audience));
    doc.push_str(RULE);

    if let Some((min, max)) = config.intro_words() {
        progress.stage(10, &format!("Intro ({min}-{max} words)"));
        let prompt = format!(
            "Write an introductory section for the eBook on '{topic}'. Target length {min}-{max} words."
        );
        doc.push_str(&streamed_section("Introduction", &prompt, backend, progress).await);
        doc.push('\n');
        doc.push_str(RULE);
    }

    doc.push_str(&results.toc);
    doc.push_str("\n\n");
    doc.push_str(RULE);

    let count = results.optimized_chapters.len();
    for (index, chapter) in results.optimized_chapters.iter().enumerate() {
        doc.push_str(chapter);
        doc.push_str("\n\n");
        if index + 1 < count {
            doc.push_str(RULE);
        }
    }

    if let Some((min, max)) = config.final_words() {
        progress.stage(10, &format!("Final Thoughts ({min}-{max} words)"));
        let prompt =
            format!("Write final thoughts for the eBook on '{topic}'. Target length {min}-{max} words.");
        doc.push_str(&streamed_section("Final Thoughts", &prompt, backend, progress).await);
        doc.push('\n');
        doc.push_str(RULE);
    }

    if let Some((min, max)) = config.review_words() {
        progress.stage(10, &format!("Leave a Review ({min}-{max} words)"));
        let prompt = format!(
            "Write a short call-to-action asking readers to leave a review for the eBook. Target length {min}-{max} words."
        );
        doc.push_str(&streamed_section("We'd Love Your Review", &prompt, backend, progress).await);
        doc.push('\n');
        doc.push_str(RULE);
    }

    doc.push_str("\n\n");
    doc.push_str(RULE);
    doc.push_str("# Appendix: Interactive Tools\n\n");
    for element in &results.interactive_elements {
        doc.push_str(&format!(
            "## {}\nType: {}\n{}\n\n",
            element.title, element.kind, element.description
        ));
    }

    let path = store.write_text(EBOOK_FILE, &doc)?;
    progress.info(&format!("eBook compiled with {count} chapters"));
    tracing::info!(path = %path.display(), chapters = count, "compiled ebook");
    Ok(path)
}

/// Streams one titled section. A backend failure leaves the prompt as the body.
async fn streamed_section(
    title: &str,
    prompt: &str,
    backend: &dyn Backend,
    progress: &dyn Progress,
) -> String {
    let mut sink = |fragment: &str| progress.fragment(fragment);
    let streamed = backend
        .stream_generate(prompt, &GenerateOptions::default(), &mut sink)
        .await;
    progress.stream_end();

    match streamed {
        Ok(text) => format!("# {title}\n\n{}\n", text.trim()),
        Err(err) => {
            tracing::warn!(section = title, error = %format!("{err:#}"), "section generation failed; using prompt text");
            progress.warning(&format!("Could not generate '{title}': {err:#}"));
            format!("# {title}\n\n{prompt}\n")
        }
    }
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
