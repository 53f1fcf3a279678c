use std::sync::Arc;

use film4you::{
    api::{create_router, AppState},
    config::Config,
    services::{CompletionTransport, StreamTransport},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("film4you=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let transport = CompletionTransport::from_config(&config);
    tracing::info!(
        transport = transport.name(),
        model = %config.llm_model,
        api_url = %config.llm_api_url,
        "Configured model backend"
    );
    let state = AppState::new(Arc::new(transport));

    // Create the router with all routes
    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");
    axum::serve(listener, app).await?;

    Ok(())
}
