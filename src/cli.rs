use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::backend::Provider;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a complete eBook from a topic (or a saved configuration).
    Generate(GenerateArgs),
    /// Print the chapter titles found in an outline file.
    ExtractChapters(ExtractChaptersArgs),
    /// Apply a book template to a saved configuration.
    ApplyTemplate(ApplyTemplateArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Initial topic for the eBook (prompted for when neither this nor --config is given).
    #[arg(long)]
    pub topic: Option<String>,

    /// Path to an existing `config.yaml`.
    #[arg(long)]
    pub config: Option<String>,

    /// Output directory for stage artifacts and the final eBook.
    #[arg(long, default_value = "./output")]
    pub output: String,

    /// Skip the template menu, parameter review and confirmation.
    #[arg(long)]
    pub auto: bool,

    /// Text-generation provider (`offline` runs without any backend).
    #[arg(long, value_enum, default_value_t = Provider::Mock)]
    pub provider: Provider,

    /// Model name (default depends on the provider).
    #[arg(long)]
    pub model: Option<String>,

    /// API key for the provider (default: read from the provider's environment variable).
    #[arg(long)]
    pub api_key: Option<String>,

    /// Generate and review parameters only; save `config.yaml` and exit.
    #[arg(long)]
    pub params_only: bool,

    /// Book template (default: standard, or a menu when not in --auto mode).
    #[arg(long, value_enum)]
    pub template: Option<TemplateName>,
}

#[derive(Debug, Args)]
pub struct ExtractChaptersArgs {
    /// Input path to an outline (e.g. `stage_2_outline.md`).
    #[arg(long)]
    pub outline: String,
}

#[derive(Debug, Args)]
pub struct ApplyTemplateArgs {
    /// Input path to `config.yaml`.
    #[arg(long)]
    pub config: String,

    #[arg(long, value_enum)]
    pub template: TemplateName,

    /// Output path (default: stdout).
    #[arg(long)]
    pub out: Option<String>,

    /// Overwrite `--out` if it already exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TemplateName {
    Standard,
    Quickstart,
    Deepdive,
}

impl TemplateName {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateName::Standard => "standard",
            TemplateName::Quickstart => "quickstart",
            TemplateName::Deepdive => "deepdive",
        }
    }
}
