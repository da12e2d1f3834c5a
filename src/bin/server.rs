//! Relay server binary.
//!
//! Reads `.env`, the optional `MINA_CONFIG` TOML file and the process
//! environment, then serves the chat relay until Ctrl-C.

use mina::config::{RelayConfig, redacted};
use mina::server::{AppState, RelayServer};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "mina=info,tower_http=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber: stderr always, plus a daily file when a
/// log directory is configured. The guard must live until exit.
fn init_tracing(config: &RelayConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &config.logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "mina.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config warnings go to stderr before the full subscriber exists.
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter())
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, RelayConfig::load)?;
    let _log_guard = init_tracing(&config)?;

    tracing::info!(
        provider = %config.llm.provider,
        proxy = config.proxy.endpoint().unwrap_or("off"),
        openai_key = %redacted(&config.llm.openai.api_key),
        google_key = %redacted(&config.llm.gemini.api_key),
        "mina starting"
    );

    let state = AppState::from_config(config)?;
    let server = RelayServer::start(state).await.map_err(|e| {
        tracing::error!(error = %e, "relay failed to start");
        anyhow::anyhow!("relay failed to start: {e}")
    })?;
    tracing::info!("serving on http://{}", server.addr());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown().await;
    tracing::info!("mina shut down cleanly");
    Ok(())
}
