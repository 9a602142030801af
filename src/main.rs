use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use aq_predictor::catalog::{Catalog, HORIZONS};
use aq_predictor::dispatch::Dispatcher;
use aq_predictor::error::PredictError;
use aq_predictor::index;
use aq_predictor::model::{Registry, TorchModelStore};
use aq_predictor::types::{ForecastResponse, Observation, RiskResponse, UNIT};

type ApiError = (StatusCode, Json<serde_json::Value>);

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    catalog: Arc<Catalog>,
}

#[derive(Deserialize)]
struct HorizonsQuery {
    horizons: Option<String>,
}

fn reject(e: PredictError) -> ApiError {
    let status = match e {
        PredictError::InvalidTarget(_) | PredictError::ModelNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        PredictError::InvalidHorizonSpec(_) | PredictError::InvalidSequence(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "aq_predictor" }))
}

async fn targets(State(state): State<AppState>) -> Json<serde_json::Value> {
    let targets: Vec<&str> = state.catalog.targets().collect();
    Json(json!({ "targets": targets, "horizons": HORIZONS }))
}

async fn predict(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Query(query): Query<HorizonsQuery>,
    Json(observations): Json<Vec<Observation>>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let horizons = Dispatcher::parse_horizons(query.horizons.as_deref()).map_err(reject)?;
    tracing::info!(
        "predict target={} horizons={:?} observations={}",
        target,
        horizons,
        observations.len()
    );
    let response = state
        .dispatcher
        .forecast(&target, &horizons, &observations)
        .map_err(reject)?;
    Ok(Json(response))
}

async fn risk(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Json(observations): Json<Vec<Observation>>,
) -> Result<Json<RiskResponse>, ApiError> {
    let (prediction, _) = state
        .dispatcher
        .predict_one(&target, 1, &observations)
        .map_err(reject)?;
    let level = index::risk_level(&target, prediction.value).map_err(reject)?;
    Ok(Json(RiskResponse {
        target,
        predicted_value: prediction.value,
        risk_level: level,
        unit: UNIT,
        message: level.message(),
    }))
}

async fn aqi(
    State(state): State<AppState>,
    Json(observations): Json<Vec<Observation>>,
) -> Result<Json<u8>, ApiError> {
    let value = state
        .dispatcher
        .composite_index(&observations)
        .map_err(reject)?;
    Ok(Json(value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let models_dir = std::env::var("MODELS_DIR").unwrap_or_else(|_| "models".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8000);

    // A leaking feature catalog is a configuration error; it must kill the
    // process here, never surface per-request.
    let catalog = Arc::new(Catalog::new()?);

    let store = TorchModelStore::new(PathBuf::from(&models_dir), &catalog);
    let registry = Arc::new(Registry::new(Box::new(store)));
    let available = registry.preload(&catalog);
    tracing::info!("{} predictor(s) loaded from {}", available, models_dir);

    let dispatcher = Arc::new(Dispatcher::new(catalog.clone(), registry));
    let state = AppState {
        dispatcher,
        catalog,
    };

    let app = axum::Router::new()
        .route("/health", get(health))
        .route("/targets", get(targets))
        .route("/predict/aqi", post(aqi))
        .route("/predict/:target", post(predict))
        .route("/predict/:target/risk", post(risk))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
