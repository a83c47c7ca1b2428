use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use strategy_synthesis::{
    adversarial::{AdversarialStats, BotWeakness},
    factor::{interpret::LatentFactor, FactorStats},
    feed::FeedStats,
    gp::{GpStats, Lineage},
    lifecycle::{LifecycleStats, StageTransition},
    observability::MetricsSnapshot,
    paper::{PaperStats, PortfolioSnapshot},
    AdversarialStrategy, GpIndividual, LifecycleEvent, LifecycleStage, PaperResult, StrategyLifecycle,
    StrategyMetrics, StrategySource, SynthesisError,
};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub feed_connected: bool,
    pub buffered_events: usize,
    pub cycles: u64,
    pub cycle_in_flight: bool,
    pub active_strategies: usize,
    pub uptime_secs: u64,
    pub metrics: MetricsSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ctx = &state.ctx;
    let feed = state.feed.stats();
    let buffered_events = ctx.buffer().read().await.len();
    let active_strategies = ctx.lifecycle_view().active_count();
    let metrics = ctx.metrics().snapshot().await;

    Json(HealthResponse {
        status: if feed.connected { "healthy" } else { "degraded" }.to_string(),
        feed_connected: feed.connected,
        buffered_events,
        cycles: ctx.cycle_count(),
        cycle_in_flight: ctx.cycle_in_flight(),
        active_strategies,
        uptime_secs: metrics.uptime_secs,
        metrics,
        timestamp: Utc::now(),
    })
}

/// GET /metrics
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.ctx.metrics().snapshot().await)
}

#[derive(Debug, Serialize)]
pub struct IngestionStats {
    pub buffered: usize,
    pub capacity: usize,
    pub total_ingested: u64,
    pub evicted: u64,
    pub latest_event_at: Option<DateTime<Utc>>,
    pub feed: FeedStats,
}

/// GET /ingestion/stats
pub async fn get_ingestion_stats(State(state): State<Arc<AppState>>) -> Json<IngestionStats> {
    let buffer = state.ctx.buffer().read().await;
    Json(IngestionStats {
        buffered: buffer.len(),
        capacity: buffer.capacity(),
        total_ingested: buffer.total_ingested(),
        evicted: buffer.evicted(),
        latest_event_at: buffer.latest_timestamp(),
        feed: state.feed.stats(),
    })
}

/// GET /gp/stats
pub async fn get_gp_stats(State(state): State<Arc<AppState>>) -> Json<GpStats> {
    Json(state.ctx.gp_view().stats.clone())
}

/// A GP individual with its tree rendered as text
#[derive(Debug, Serialize)]
pub struct IndividualView {
    pub id: Uuid,
    pub fitness: f64,
    pub adjusted_fitness: f64,
    pub metrics: StrategyMetrics,
    pub lineage: Lineage,
    pub depth: usize,
    pub nodes: usize,
    pub tree: String,
}

impl From<&GpIndividual> for IndividualView {
    fn from(ind: &GpIndividual) -> Self {
        Self {
            id: ind.id,
            fitness: ind.fitness,
            adjusted_fitness: ind.adjusted_fitness,
            metrics: ind.metrics.clone(),
            lineage: ind.lineage.clone(),
            depth: ind.tree.depth(),
            nodes: ind.tree.node_count(),
            tree: ind.tree.to_string(),
        }
    }
}

/// GET /gp/hall-of-fame
pub async fn get_hall_of_fame(State(state): State<Arc<AppState>>) -> Json<Vec<IndividualView>> {
    let gp = state.ctx.gp_view();
    Json(gp.hall_of_fame.iter().map(IndividualView::from).collect())
}

#[derive(Debug, Serialize)]
pub struct FactorsResponse {
    pub stats: FactorStats,
    pub factors: Vec<LatentFactor>,
}

/// GET /factors
pub async fn get_factors(State(state): State<Arc<AppState>>) -> Json<FactorsResponse> {
    let factor = state.ctx.factor_view();
    Json(FactorsResponse {
        stats: factor.stats.clone(),
        factors: factor.factors.clone(),
    })
}

/// GET /adversarial/stats
pub async fn get_adversarial_stats(State(state): State<Arc<AppState>>) -> Json<AdversarialStats> {
    Json(state.ctx.adversarial_view().stats.clone())
}

/// GET /adversarial/weaknesses
pub async fn get_weaknesses(State(state): State<Arc<AppState>>) -> Json<Vec<BotWeakness>> {
    Json(state.ctx.adversarial_view().weaknesses.clone())
}

#[derive(Debug, Serialize)]
pub struct AdversarialStrategyView {
    pub id: Uuid,
    pub target_bots: Vec<String>,
    pub weakness_ids: Vec<Uuid>,
    pub expected_edge: f64,
    pub confidence: f64,
    pub severity: f64,
    pub simulated_return: f64,
    pub composite: bool,
    pub created_at: DateTime<Utc>,
    pub tree: String,
}

impl From<&AdversarialStrategy> for AdversarialStrategyView {
    fn from(s: &AdversarialStrategy) -> Self {
        Self {
            id: s.id,
            target_bots: s.target_bots.clone(),
            weakness_ids: s.weakness_ids.clone(),
            expected_edge: s.expected_edge,
            confidence: s.confidence,
            severity: s.severity,
            simulated_return: s.simulated_return,
            composite: s.composite,
            created_at: s.created_at,
            tree: s.tree.to_string(),
        }
    }
}

/// GET /adversarial/strategies
pub async fn get_adversarial_strategies(State(state): State<Arc<AppState>>) -> Json<Vec<AdversarialStrategyView>> {
    let adversarial = state.ctx.adversarial_view();
    Json(adversarial.strategies.iter().map(AdversarialStrategyView::from).collect())
}

/// GET /paper/stats
pub async fn get_paper_stats(State(state): State<Arc<AppState>>) -> Json<PaperStats> {
    Json(state.ctx.paper().lock().await.stats())
}

/// GET /paper/portfolios/:id
pub async fn get_portfolio(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PortfolioSnapshot>, (StatusCode, String)> {
    state
        .ctx
        .paper()
        .lock()
        .await
        .snapshot(&id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("No paper portfolio for {}", id)))
}

/// GET /lifecycle/stats
pub async fn get_lifecycle_stats(State(state): State<Arc<AppState>>) -> Json<LifecycleStats> {
    Json(state.ctx.lifecycle_view().stats.clone())
}

/// A lifecycle record with its tree rendered as text
#[derive(Debug, Serialize)]
pub struct StrategyView {
    pub id: String,
    pub stage: LifecycleStage,
    pub source: StrategySource,
    pub birth_generation: u64,
    pub parents: Vec<String>,
    pub health: f64,
    pub allocation: f64,
    pub incubation_fitness: Option<f64>,
    pub incubation_metrics: Option<StrategyMetrics>,
    pub paper_result: Option<PaperResult>,
    pub validation_score: Option<f64>,
    pub born_at: DateTime<Utc>,
    pub stage_entered_at: DateTime<Utc>,
    pub retirement_reason: Option<String>,
    pub history: Vec<StageTransition>,
    pub tree: String,
}

impl From<&StrategyLifecycle> for StrategyView {
    fn from(r: &StrategyLifecycle) -> Self {
        Self {
            id: r.id.clone(),
            stage: r.stage,
            source: r.source,
            birth_generation: r.birth_generation,
            parents: r.parents.clone(),
            health: r.health,
            allocation: r.allocation,
            incubation_fitness: r.incubation_fitness,
            incubation_metrics: r.incubation_metrics.clone(),
            paper_result: r.paper_result.clone(),
            validation_score: r.validation_score,
            born_at: r.born_at,
            stage_entered_at: r.stage_entered_at,
            retirement_reason: r.retirement_reason.clone(),
            history: r.history.clone(),
            tree: r.tree.to_string(),
        }
    }
}

/// Query params for the strategy listing
#[derive(Debug, Deserialize)]
pub struct StrategyQuery {
    pub stage: Option<LifecycleStage>,
}

/// GET /lifecycle/strategies?stage=PAPER
pub async fn list_strategies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StrategyQuery>,
) -> Json<Vec<StrategyView>> {
    let lifecycle = state.ctx.lifecycle_view();
    let views = match query.stage {
        Some(stage) => lifecycle.by_stage(stage).into_iter().map(StrategyView::from).collect(),
        None => lifecycle.active().map(StrategyView::from).collect(),
    };
    Json(views)
}

/// GET /lifecycle/strategies/:id
pub async fn get_strategy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StrategyView>, (StatusCode, String)> {
    let lifecycle = state.ctx.lifecycle_view();
    lifecycle
        .get(&id)
        .map(|r| Json(StrategyView::from(r)))
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown strategy: {}", id)))
}

#[derive(Debug, Deserialize)]
pub struct ValidationScoreRequest {
    pub score: f64,
}

/// POST /lifecycle/strategies/:id/validation-score
pub async fn submit_validation_score(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ValidationScoreRequest>,
) -> Result<Json<Vec<LifecycleEvent>>, (StatusCode, String)> {
    if !(0.0..=1.0).contains(&request.score) {
        return Err((StatusCode::BAD_REQUEST, "score must be within [0, 1]".to_string()));
    }

    info!("Validation score {:.3} submitted for {}", request.score, id);
    match state.ctx.submit_validation_score(&id, request.score).await {
        Ok(events) => Ok(Json(events)),
        Err(SynthesisError::UnknownStrategy(id)) => Err((StatusCode::NOT_FOUND, format!("Unknown strategy: {}", id))),
        Err(e) => {
            warn!("Validation score rejected for {}: {}", id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// GET /ws - push socket for synthesis notifications
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ctx.bus().subscribe();

    info!("Push client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let notification = match rx.recv().await {
                Ok(n) => n,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Push client lagging, skipped {} notifications", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let json = match serde_json::to_string(&notification) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize notification: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                debug!("Push send failed, client disconnected");
                break;
            }
        }
    });

    // inbound frames are ignored; the socket is push-only
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Push client disconnected");
}
