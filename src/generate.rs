use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use clap::ValueEnum as _;

use crate::backend::create_backend;
use crate::cli::{ApplyTemplateArgs, ExtractChaptersArgs, GenerateArgs, TemplateName};
use crate::formats::BookConfig;
use crate::interactive::Console;
use crate::outline::extract_chapter_titles;
use crate::params::build_config;
use crate::progress::{Progress, TerminalProgress};
use crate::stages::{self, COVER_PROMPT_FILE, DIAGRAMS_FILE, INTERACTIVE_FILE};
use crate::store::ArtifactStore;
use crate::template::apply_template;

pub const CONFIG_FILE: &str = "config.yaml";

pub async fn run(args: GenerateArgs) -> anyhow::Result<()> {
    let progress = TerminalProgress::stdout();
    progress.header("Nine-Stage Automated eBook Generation System");

    let provider_name = args
        .provider
        .to_possible_value()
        .map(|v| v.get_name().to_owned())
        .unwrap_or_default();
    progress.info(&format!("Initializing backend (provider: {provider_name})"));
    let selected = create_backend(args.provider, args.api_key.clone(), args.model.clone());
    let backend = selected.as_deref();
    match backend {
        Some(backend) => progress.success(&format!("Backend ready: {}", backend.name())),
        None => progress.info("Offline mode: every stage uses its built-in fallback"),
    }

    let (store, created) = ArtifactStore::create(&args.output)?;
    if created {
        progress.success(&format!("Created output directory: {}", store.dir().display()));
    }

    let mut console = Console::new(std::io::stdin().lock(), std::io::stdout());

    let config = match (args.config.as_deref(), args.topic.as_deref()) {
        (Some(path), _) if Path::new(path).exists() => {
            progress.info(&format!("Loading configuration from: {path}"));
            load_config(path)?
        }
        (config_path, topic) => {
            if let Some(path) = config_path {
                tracing::warn!(path, "config file not found; deriving configuration from topic");
            }
            let topic = match topic {
                Some(topic) => topic.to_owned(),
                None => {
                    progress.header("Interactive Topic Entry");
                    let topic = console.ask("Enter your eBook topic", None)?;
                    if topic.is_empty() {
                        anyhow::bail!("topic is required");
                    }
                    topic
                }
            };
            build_config(&topic, backend, &progress).await.config
        }
    };

    let template = match args.template {
        Some(template) => template,
        None if args.auto => TemplateName::Standard,
        None => {
            progress.header("Choose a Book Template");
            console.choose_template()?
        }
    };
    tracing::info!(template = template.as_str(), "applying template");
    let mut config = apply_template(config, template);

    if !args.auto {
        progress.header("Review & Modify Configuration");
        config = console.edit_config(config)?;
    }
    config.validate().context("invalid configuration")?;

    let config_path = store.write_yaml(CONFIG_FILE, &config)?;
    progress.success(&format!("Configuration saved to: {}", config_path.display()));

    if args.params_only {
        progress.header("Parameters-only mode");
        console.display_config(&config)?;
        progress.success("Configuration saved. Exiting without running generation stages.");
        return Ok(());
    }

    if args.auto {
        progress.info("Auto mode enabled - proceeding with generation...");
    } else {
        progress.header("Ready to Generate eBook");
        console.display_config(&config)?;
        if !console.confirm("Generate eBook with this configuration?")? {
            progress.warning("eBook generation cancelled");
            return Ok(());
        }
    }

    let output = stages::execute(&config, &store, backend, &progress)
        .await
        .context("ebook generation failed")?;

    progress.header("✓ eBook Generation Complete!");
    progress.success(&format!("Output directory: {}", store.dir().display()));
    progress.success(&format!("Final eBook: {}", output.ebook_path.display()));
    progress.info("Next steps:");
    progress.detail(&format!("1. Review your eBook: {}", output.ebook_path.display()));
    progress.detail(&format!(
        "2. Generate cover image using: {}",
        store.path(COVER_PROMPT_FILE).display()
    ));
    progress.detail(&format!(
        "3. Generate diagrams using: {}",
        store.path(DIAGRAMS_FILE).display()
    ));
    progress.detail(&format!(
        "4. Create interactive elements from: {}",
        store.path(INTERACTIVE_FILE).display()
    ));
    progress.detail("");
    progress.detail(&format!(
        "Full generation metadata: {}",
        output.metadata_path.display()
    ));
    Ok(())
}

pub fn load_config(path: &str) -> anyhow::Result<BookConfig> {
    let yaml = std::fs::read_to_string(path).with_context(|| format!("read config: {path}"))?;
    let config: BookConfig =
        serde_yaml::from_str(&yaml).with_context(|| format!("parse config yaml: {path}"))?;
    Ok(config)
}

pub fn extract_chapters(args: ExtractChaptersArgs) -> anyhow::Result<()> {
    let outline = std::fs::read_to_string(&args.outline)
        .with_context(|| format!("read outline: {}", args.outline))?;

    let titles = extract_chapter_titles(&outline);
    if titles.is_empty() {
        tracing::warn!(outline = %args.outline, "no chapter titles found");
    }

    let mut stdout = std::io::stdout().lock();
    for title in titles {
        writeln!(stdout, "{title}").context("write stdout")?;
    }
    Ok(())
}

pub fn apply_template_command(args: ApplyTemplateArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let config = apply_template(config, args.template);
    config.validate().context("invalid configuration")?;
    let yaml = serde_yaml::to_string(&config).context("serialize config yaml")?;

    match args.out.as_deref() {
        Some(out) => write_output(out, &yaml, args.force)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(yaml.as_bytes()).context("write stdout")?;
            stdout.flush().context("flush stdout")?;
        }
    }
    Ok(())
}

fn write_output(path: &str, contents: &str, force: bool) -> anyhow::Result<()> {
    if Path::new(path).exists() && !force {
        anyhow::bail!("output already exists: {path}");
    }
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("open output: {path}"))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write output: {path}"))?;
    file.flush()
        .with_context(|| format!("flush output: {path}"))?;
    Ok(())
}
