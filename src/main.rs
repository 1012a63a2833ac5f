use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    ebookgen::logging::init().context("init logging")?;

    let cli = ebookgen::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        ebookgen::cli::Command::Generate(args) => {
            ebookgen::generate::run(args).await.context("generate")?;
        }
        ebookgen::cli::Command::ExtractChapters(args) => {
            ebookgen::generate::extract_chapters(args).context("extract chapters")?;
        }
        ebookgen::cli::Command::ApplyTemplate(args) => {
            ebookgen::generate::apply_template_command(args).context("apply template")?;
        }
    }

    Ok(())
}
