// 🌐 Prediction Service - /health and /predict over the saved champion
// The artifact is loaded once at startup and shared read-only.

use crate::model::ChampionArtifact;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub champion: Arc<ChampionArtifact>,
    pub threshold: f64,
}

impl AppState {
    pub fn new(champion: ChampionArtifact, threshold: f64) -> Self {
        Self {
            champion: Arc::new(champion),
            threshold,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// Column name -> value, e.g. a row of model_X
    pub features: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub prediction: u8,
    pub probability_default: f64,
    pub threshold: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Payload reindexed to the champion columns: absent, null, non-numeric
/// and non-finite values become NaN
pub fn feature_row(features: &Map<String, Value>, columns: &[String]) -> Array2<f64> {
    let values: Vec<f64> = columns
        .iter()
        .map(|c| {
            features
                .get(c)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite())
                .unwrap_or(f64::NAN)
        })
        .collect();
    Array2::from_shape_fn((1, values.len()), |(_, j)| values[j])
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// POST /predict
async fn predict(State(state): State<AppState>, Json(req): Json<PredictRequest>) -> Response {
    let row = feature_row(&req.features, &state.champion.numeric_columns);
    debug!(
        provided = req.features.len(),
        expected = state.champion.numeric_columns.len(),
        "predict request"
    );

    match state.champion.predict_matrix(&row) {
        Ok(proba) => {
            let p = proba.first().copied().unwrap_or(f64::NAN);
            Json(PredictResponse {
                prediction: u8::from(p >= state.threshold),
                probability_default: p,
                threshold: state.threshold,
            })
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "prediction failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .with_state(state)
}
