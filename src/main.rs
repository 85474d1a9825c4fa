use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use mentora_backend::core::logging;
use mentora_backend::server::router;
use mentora_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    match state.llm.health_check().await {
        Ok(true) => tracing::info!("Ollama reachable at {}", state.config.ollama.base_url),
        _ => tracing::warn!(
            "Ollama not reachable at {}; model calls will degrade to inline errors",
            state.config.ollama.base_url
        ),
    }

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(state.config.server.port);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("MENTORA_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
