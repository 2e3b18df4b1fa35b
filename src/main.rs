use tracing_subscriber::EnvFilter;

use web_rag::api;
use web_rag::config::Config;
use web_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!(
        "Collections: {:?}, chunk {}/{} tokens, threshold {}",
        config.rag.collection_mode,
        config.rag.chunk_size,
        config.rag.chunk_overlap,
        config.rag.similarity_threshold
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config)?;
    let rag = state.rag.clone();

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    rag.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
