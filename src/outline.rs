use std::sync::LazyLock;

use regex::Regex;

static CHAPTER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#{2,6}\s+|[-*]\s+)?(?i:chapter)\s+\d+\s*[-–]\s*(.+)$")
        .expect("chapter line regex is valid")
});

static SUB_NUMBERING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+").expect("sub-numbering regex is valid"));

/// Extracts the top-level chapter titles from free-form outline text.
///
/// Accepted lines (after trimming) look like `## Chapter 2 - Title`,
/// `### Chapter 3 – Title` or `- Chapter 4 - Title`; the leading heading or
/// bullet marker is optional. Em-dashes are read as hyphens. Titles that start
/// with sub-numbering (`1.1 ...`) are skipped, and repeated titles keep their
/// first position only.
pub fn extract_chapter_titles(outline: &str) -> Vec<String> {
    let mut titles: Vec<String> = Vec::new();

    for raw in outline.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let line = line.replace('—', "-");
        let Some(captures) = CHAPTER_LINE.captures(&line) else {
            continue;
        };

        let title = captures[1].trim_end_matches(|c: char| c == '.' || c.is_whitespace());
        let title = title.trim_start();
        if title.is_empty() || SUB_NUMBERING.is_match(title) {
            continue;
        }
        if !titles.iter().any(|seen| seen == title) {
            titles.push(title.to_owned());
        }
    }

    titles
}
