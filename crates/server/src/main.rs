use anyhow::Context;
use coach_server::{config::Config, router, state::AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(predictor = %config.coach.predictor_url, "Predictor configured");
    match &config.coach.explainer_url {
        Some(url) => tracing::info!(explainer = %url, "Explanation service configured"),
        None => tracing::info!("EXPLAINER_URL not set - explanations disabled"),
    }

    let state = AppState::new(config.coach.clone())?;
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
