use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

mod config;
mod error;
mod logging;
mod routes;
mod services;
mod models;

use services::file_processor::UploadCache;
use services::normalizer::Normalizer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;
    
    // Load configuration
    let config = config::load_config()?;
    let addr = config.bind_addr;
    
    // Build our application state
    let state = Arc::new(AppState::new(config));
    
    // Build our application with a route
    let app = Router::new()
        .merge(routes::routes())
        .merge(routes::dashboard::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Run it
    tracing::info!("listening on {}", addr);
    
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// Application state
pub struct AppState {
    config: config::Config,
    uploads: UploadCache,
    normalizer: Normalizer,
}

impl AppState {
    fn new(config: config::Config) -> Self {
        let uploads = UploadCache::from_config(&config);
        Self {
            config,
            uploads,
            normalizer: Normalizer::default(),
        }
    }
}
