use analysis_orchestrator::{AnalysisOrchestrator, BriefGenerator, TradeScanner};
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use engine_core::{EngineError, QuoteSource};
use llm_scorer::HttpLlmScorer;
use portfolio_engine::PortfolioAggregator;
use quote_client::QuoteClient;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod execute;
pub mod presets;
pub mod public;
pub mod shaping;
pub mod store;
pub mod tiers;

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod gateway_tests;

use store::GatewayStore;
use tiers::TierMatrix;

/// Default wall-clock budget for one /execute request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Public landing cache refresh interval.
pub const PUBLIC_CACHE_TTL: Duration = Duration::from_secs(300);

/// Runs stuck in `running` longer than this are swept to `error`.
pub const ORPHAN_RUN_AGE: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub scanner: Arc<TradeScanner>,
    pub brief: Arc<BriefGenerator>,
    pub portfolio: Arc<PortfolioAggregator>,
    pub quotes: Arc<dyn QuoteSource>,
    pub store: GatewayStore,
    pub tiers: Arc<TierMatrix>,
    pub request_timeout: Duration,
    pub public_cache_ttl: Duration,
}

impl AppState {
    /// Wire the full engine stack around a quote source and store.
    pub fn build(
        quotes: Arc<dyn QuoteSource>,
        store: GatewayStore,
        tiers: TierMatrix,
    ) -> Self {
        let mut orchestrator = AnalysisOrchestrator::new(Arc::clone(&quotes));
        if let Some(llm) = HttpLlmScorer::from_env() {
            orchestrator = orchestrator.with_llm(Arc::new(llm));
        }
        let orchestrator = Arc::new(orchestrator);

        Self {
            scanner: Arc::new(TradeScanner::new(Arc::clone(&orchestrator))),
            brief: Arc::new(BriefGenerator::new(Arc::clone(&orchestrator))),
            portfolio: Arc::new(PortfolioAggregator::new(Arc::clone(&quotes))),
            orchestrator,
            quotes,
            store,
            tiers: Arc::new(tiers),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            public_cache_ttl: PUBLIC_CACHE_TTL,
        }
    }
}

/// Standard response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Gateway error: wraps the engine taxonomy and owns the HTTP mapping.
/// Internal detail never reaches the response body.
#[derive(Debug)]
pub struct AppError(pub EngineError);

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error = self.0;
        let code = error.code();
        let (status, body) = match &error {
            EngineError::Validation(msg)
            | EngineError::InsufficientData(msg)
            | EngineError::OptionDataUnavailable(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "error": code, "message": msg }),
            ),
            EngineError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "error": code, "message": "missing or invalid bearer token" }),
            ),
            EngineError::TierDenied(tool) => (
                StatusCode::FORBIDDEN,
                json!({
                    "success": false,
                    "error": code,
                    "message": format!("current tier does not include {tool}"),
                    "upgrade_required": true,
                }),
            ),
            EngineError::QuotaExceeded { used, limit } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "success": false,
                    "error": code,
                    "message": format!("daily limit reached ({used}/{limit})"),
                    "usage": { "count": used, "limit": limit },
                }),
            ),
            EngineError::DataFetch(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "success": false, "error": code, "message": msg }),
            ),
            EngineError::Database(_) | EngineError::Internal(_) => {
                let correlation = uuid::Uuid::new_v4();
                tracing::error!(correlation_id = %correlation, error = %error, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "success": false,
                        "error": "internal",
                        "correlation_id": correlation.to_string(),
                    }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/execute", axum::routing::post(execute::execute))
        .route(
            "/presets",
            get(presets::list_presets)
                .post(presets::create_preset)
                .put(presets::update_preset)
                .delete(presets::delete_preset),
        )
        .layer(middleware::from_fn(auth::auth_middleware));

    Router::new()
        .route("/health", get(public::health))
        .route("/latest-runs", get(public::latest_runs))
        .merge(authed)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodic janitor: orphaned `running` rows (crashed or dropped mid-flight
/// without the guard firing) are transitioned to error.
fn spawn_run_janitor(store: GatewayStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            match store.sweep_orphan_runs(ORPHAN_RUN_AGE).await {
                Ok(0) => {}
                Ok(swept) => tracing::warn!(swept, "janitor: orphaned runs marked error"),
                Err(e) => tracing::error!(error = %e, "janitor sweep failed"),
            }
        }
    });
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:engine.db?mode=rwc".to_string());
    let store = GatewayStore::connect(&database_url).await?;

    let api_key = std::env::var("QUOTE_API_KEY").unwrap_or_default();
    let quotes: Arc<dyn QuoteSource> = match std::env::var("QUOTE_BASE_URL") {
        Ok(base) => Arc::new(QuoteClient::with_base_url(api_key, base)),
        Err(_) => Arc::new(QuoteClient::new(api_key)),
    };

    let tiers = match std::env::var("TIER_MATRIX_FILE") {
        Ok(path) => TierMatrix::from_file(&path)?,
        Err(_) => TierMatrix::default_matrix(),
    };

    let state = AppState::build(quotes, store.clone(), tiers);
    spawn_run_janitor(store);

    let router = build_router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("listening on port {port}");
    axum::serve(listener, router).await?;
    Ok(())
}
