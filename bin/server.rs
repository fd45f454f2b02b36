// Credit Default Risk - Prediction Server
// Serves the champion saved by `credit-risk train-final`

use anyhow::{Context, Result};
use credit_default_risk::service::{router, AppState};
use credit_default_risk::{ChampionArtifact, PipelineConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("CREDIT_RISK_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🌐 Credit Default Risk - Prediction Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = PipelineConfig::load(None).context("loading configuration")?;

    let artifacts = config.paths.artifacts();
    let champion = ChampionArtifact::load(&artifacts).with_context(|| {
        format!(
            "no champion at {} (run: credit-risk train-final)",
            artifacts.display()
        )
    })?;
    println!("✓ Champion loaded: {} features", champion.numeric_columns.len());

    let app = router(AppState::new(champion, config.model.threshold))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!(%addr, "listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   GET  /health");
    println!("   POST /predict");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
