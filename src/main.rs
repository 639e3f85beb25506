use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use asr_stream::config::AppConfig;
use asr_stream::engine::EngineRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let config = AppConfig::from_env_and_args();
    let listen = resolve_listen_addr(&config)?;
    let engines = Arc::new(EngineRegistry::new(
        config.model_path.clone(),
        config.threads,
    ));
    info!(
        %listen,
        model = %config.model_path,
        sample_rate = config.sample_rate,
        lang = %config.language,
        "starting streaming asr server"
    );
    let app = asr_stream::server::router(config, engines);
    let listener = TcpListener::bind(listen)
        .await
        .context("failed to bind tcp listener")?;
    axum::serve(listener, app.into_make_service())
        .await
        .context("websocket server exited")?;
    Ok(())
}

fn setup_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

fn resolve_listen_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address '{}'", config.listen))
}
