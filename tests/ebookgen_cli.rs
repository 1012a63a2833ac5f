use std::fs;

use predicates::prelude::*;

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let outline = temp.path().join("outline.md");
    fs::write(&outline, "## Chapter 1 - One\n")?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.env("RUST_LOG", "debug")
        .args(["extract-chapters", "--outline"])
        .arg(&outline)
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}

#[test]
fn extract_chapters_prints_unique_titles_in_order() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let outline = temp.path().join("stage_2_outline.md");
    fs::write(
        &outline,
        "# Book\n\
## Chapter 1 – Alpha\n\
### Chapter 2 - Beta\n\
- Chapter 3 – Alpha\n\
## Chapter 4 - 4.1 Nested\n\
* Chapter 5 — Gamma.\n",
    )?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args(["extract-chapters", "--outline"])
        .arg(&outline)
        .assert()
        .success()
        .stdout("Alpha\nBeta\nGamma\n");
    Ok(())
}

#[test]
fn extract_chapters_fails_for_missing_file() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args(["extract-chapters", "--outline", "does/not/exist.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read outline"));
}

#[test]
fn params_only_saves_config_without_running_stages() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("out");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args([
        "generate",
        "--topic",
        "stress relief for beginners",
        "--provider",
        "offline",
        "--auto",
        "--params-only",
        "--output",
    ])
    .arg(&out)
    .assert()
    .success()
    .stdout(predicate::str::contains("Parameters-only mode"))
    .stdout(predicate::str::contains("Content Parameters:"));

    let config: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(out.join("config.yaml"))?)?;
    assert_eq!(config["topic"].as_str(), Some("stress relief for beginners"));
    assert_eq!(config["theme"].as_str(), Some("beginner-friendly transformation"));
    assert_eq!(config["min_search_results"].as_u64(), Some(12_000_000));
    assert_eq!(config["num_chapters"].as_u64(), Some(5));
    assert_eq!(config["intro_min_words"].as_u64(), Some(600));
    assert!(!out.join("stage_1_queries.txt").exists());
    Ok(())
}

#[test]
fn unavailable_provider_falls_back_to_mock() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("out");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.env_remove("OPENAI_API_KEY")
        .args([
            "generate",
            "--topic",
            "sleep hygiene",
            "--provider",
            "openai",
            "--auto",
            "--params-only",
            "--output",
        ])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Backend ready: mock"))
        .stderr(predicate::str::contains("falling back to mock backend"));

    let config = fs::read_to_string(out.join("config.yaml"))?;
    assert!(config.contains("main_keyword: sleep"), "{config}");
    Ok(())
}

#[test]
fn declining_confirmation_cancels_cleanly() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("out");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args([
        "generate",
        "--topic",
        "yoga",
        "--provider",
        "offline",
        "--template",
        "standard",
        "--output",
    ])
    .arg(&out)
    // no edits, then decline generation
    .write_stdin("n\nn\n")
    .assert()
    .success()
    .stdout(predicate::str::contains("eBook generation cancelled"));

    assert!(out.join("config.yaml").is_file());
    assert!(!out.join("FINAL_EBOOK.md").exists());
    Ok(())
}

#[test]
fn interactive_session_picks_template_and_edits_parameters() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("out");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args(["generate", "--provider", "offline", "--output"])
        .arg(&out)
        .write_stdin("mindful running\n5\n2\ny\n9\nlots\n900\nn\ny\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Invalid selection"))
        .stdout(predicate::str::contains("Updated chapter_length"));

    let config = fs::read_to_string(out.join("config.yaml"))?;
    assert!(config.contains("topic: mindful running"), "{config}");
    assert!(config.contains("chapter_length: 900"), "{config}");
    assert!(config.contains("num_chapters: 3"), "{config}");
    assert!(out.join("stage_4_chapter_3.md").is_file());
    assert!(!out.join("stage_4_chapter_4.md").exists());
    Ok(())
}

#[test]
fn empty_prompted_topic_is_an_error() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args(["generate", "--provider", "offline", "--output"])
        .arg(temp.path().join("out"))
        .write_stdin("\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("topic is required"));
    Ok(())
}

#[test]
fn apply_template_rewrites_saved_config() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let config_path = temp.path().join("config.yaml");
    let config = ebookgen::params::heuristic_config("yoga");
    fs::write(&config_path, serde_yaml::to_string(&config)?)?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args(["apply-template", "--template", "deepdive", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("num_chapters: 8"))
        .stdout(predicate::str::contains("chapter_length: 2000"))
        .stdout(predicate::str::contains("review_max_words: 700"));

    let out = temp.path().join("quick.yaml");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args(["apply-template", "--template", "quickstart", "--config"])
        .arg(&config_path)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let applied: ebookgen::formats::BookConfig = serde_yaml::from_str(&fs::read_to_string(&out)?)?;
    assert_eq!(applied.num_chapters, 3);
    assert_eq!(applied.intro_words(), Some((300, 500)));

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ebookgen");
    cmd.args(["apply-template", "--template", "standard", "--config"])
        .arg(&config_path)
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("output already exists"));
    Ok(())
}
