use tower_http::cors::{Any, CorsLayer};
use tracing::info;

mod configuration;
mod error;
mod routes;
mod state;

use configuration::Settings;
use state::AppState;
use tinychat::providers::configs::OllamaProviderConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let settings = Settings::new()?;

    // Create app state
    let state = AppState {
        ollama: OllamaProviderConfig {
            host: settings.ollama.host.clone(),
        },
        models: settings.models.clone(),
    };

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    info!("forwarding chat requests to {}", settings.ollama.host);

    axum::serve(listener, app).await?;
    Ok(())
}
