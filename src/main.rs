use std::process::ExitCode;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;

use queue_agent::config::{AgentConfig, paths};
use queue_agent::invocation::{self, EXIT_FAILURE};

/// HTTP client chatter stays at WARN unless RUST_LOG says otherwise.
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn";

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let _log_guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    ExitCode::from(invocation::run(config).await)
}

/// Log to `<log_dir>/agent.log`. The returned guard flushes on drop.
fn init_logging(config: &AgentConfig) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("creating log directory {}", config.log_dir.display()))?;

    let appender = tracing_appender::rolling::never(&config.log_dir, paths::LOG);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))?;

    Ok(guard)
}
