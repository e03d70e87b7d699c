mod batch;
mod compile;
mod gemini;
mod guide;
mod models;
mod pipeline;
mod routes;
mod seo;
mod story;
mod templates;

use axum::{
    routing::{get, post},
    Router,
};
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{fmt, EnvFilter};

use crate::gemini::{GeminiClient, ModelGateway};
use crate::pipeline::ScriptPipeline;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let gemini = Arc::new(GeminiClient::new());
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        match gemini.configure(key) {
            Ok(()) => tracing::info!("API key loaded from environment"),
            Err(e) => tracing::warn!("ignoring GEMINI_API_KEY from environment: {e}"),
        }
    }
    let gateway: Arc<dyn ModelGateway> = gemini.clone();
    let state = AppState {
        gemini,
        pipeline: Arc::new(ScriptPipeline::new(gateway)),
    };

    let app = Router::new()
        .route("/api/key", post(routes::configure_key))
        .route("/api/chat", post(routes::chat))
        .route("/api/script/state", get(routes::script_state))
        .route("/api/script/start", post(routes::start_script))
        .route("/api/script/guide", post(routes::advance_guide))
        .route("/api/script/prompts", post(routes::advance_prompts))
        .route("/api/script/cancel", post(routes::cancel_script))
        .route("/api/script/reset", post(routes::reset_script))
        .route("/api/seo/titles", post(routes::seo_titles))
        .route("/api/seo/description", post(routes::seo_description))
        .route("/api/seo/tags", post(routes::seo_tags))
        .route("/api/seo/thumbnail-texts", post(routes::thumbnail_texts))
        .route("/api/seo/thumbnail-prompts", post(routes::thumbnail_prompts))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Starting server");
    axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app)
        .await
        .unwrap();
}
