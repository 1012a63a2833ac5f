use anyhow::Context as _;

/// HTTP client internals stay quiet unless `RUST_LOG` asks for them.
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper_util=warn";

/// Installs the stderr subscriber. Stdout is reserved for run progress and
/// command output (`extract-chapters`, `apply-template`).
pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
