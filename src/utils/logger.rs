use crate::utils::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `level` when set. JSON output goes to `log_file` in
/// append mode when one is given, otherwise to stdout.
pub fn init_logger(level: &str, json_output: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    let registry = tracing_subscriber::registry().with(filter);

    if json_output {
        // JSON formatting for production
        if let Some(path) = log_file {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;

            registry.with(fmt::layer().json().with_writer(file)).try_init()?;
        } else {
            registry.with(fmt::layer().json()).try_init()?;
        }
    } else {
        // Pretty formatting for development
        registry.with(fmt::layer().pretty()).try_init()?;
    }
    Ok(())
}

pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    let json = config.output.eq_ignore_ascii_case("json");
    let log_file = (!config.file_path.is_empty()).then(|| Path::new(&config.file_path));
    init_logger(&config.level, json, log_file)
}
