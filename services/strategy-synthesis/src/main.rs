use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};

use strategy_synthesis::{ArenaFeedClient, Config, SynthesisContext};

/// Application state shared across handlers
pub struct AppState {
    pub ctx: Arc<SynthesisContext>,
    pub feed: ArenaFeedClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Strategy Synthesis Service...");

    let config = Config::load()?;
    info!(
        feed = %config.feed.url,
        population = config.gp.population_size,
        islands = config.gp.islands,
        cycle_interval_secs = config.orchestrator.cycle_interval_secs,
        "Configuration loaded"
    );

    let ctx = Arc::new(SynthesisContext::new(config.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(config.feed.channel_capacity.max(1));

    let feed = ArenaFeedClient::new(config.feed.clone(), event_tx, ctx.metrics().clone());

    let tasks = vec![
        tokio::spawn(feed.clone().run(shutdown_rx.clone())),
        tokio::spawn(Arc::clone(&ctx).run_ingestion(event_rx, shutdown_rx.clone())),
        tokio::spawn(Arc::clone(&ctx).run_synthesis_loop(shutdown_rx.clone())),
        tokio::spawn(Arc::clone(&ctx).run_health_sweep(shutdown_rx)),
    ];
    info!("✓ Feed, ingestion, synthesis and health sweep tasks started");

    let state = Arc::new(AppState {
        ctx: Arc::clone(&ctx),
        feed,
    });

    // Build router
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics))
        .route("/ingestion/stats", get(handlers::get_ingestion_stats))
        .route("/gp/stats", get(handlers::get_gp_stats))
        .route("/gp/hall-of-fame", get(handlers::get_hall_of_fame))
        .route("/factors", get(handlers::get_factors))
        .route("/adversarial/stats", get(handlers::get_adversarial_stats))
        .route("/adversarial/weaknesses", get(handlers::get_weaknesses))
        .route("/adversarial/strategies", get(handlers::get_adversarial_strategies))
        .route("/paper/stats", get(handlers::get_paper_stats))
        .route("/paper/portfolios/:id", get(handlers::get_portfolio))
        .route("/lifecycle/stats", get(handlers::get_lifecycle_stats))
        .route("/lifecycle/strategies", get(handlers::list_strategies))
        .route("/lifecycle/strategies/:id", get(handlers::get_strategy))
        .route(
            "/lifecycle/strategies/:id/validation-score",
            post(handlers::submit_validation_score),
        )
        .route("/ws", get(handlers::ws_handler))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port)).await?;
    info!("🚀 Strategy Synthesis Service listening on port {}", config.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // the synthesis loop lets an in-flight cycle finish before returning
    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task failed: {}", e);
        }
    }
    info!("Strategy Synthesis Service stopped");

    Ok(())
}

mod handlers;
