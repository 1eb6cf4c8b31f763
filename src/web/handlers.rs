//! HTTP request handlers.

use super::AppState;
use crate::db::{PrtgConfig, SensorRecord};
use crate::error::PrtgError;
use crate::prtg::{test_connection, ChartPreview, ConnectionCandidate, SyncReport, TestOutcome};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// API: Connection test
// ============================================================================

pub async fn handle_test_connection(
    State(state): State<AppState>,
    Json(candidate): Json<ConnectionCandidate>,
) -> impl IntoResponse {
    let (status, outcome) = match test_connection(&candidate).await {
        Ok(outcome) => (StatusCode::OK, outcome),
        Err(PrtgError::Validation(message)) => (
            StatusCode::BAD_REQUEST,
            TestOutcome {
                success: false,
                message,
                http_code: None,
            },
        ),
        Err(e) => {
            tracing::error!("PRTG test connection failure: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                TestOutcome {
                    success: false,
                    message: e.to_string(),
                    http_code: None,
                },
            )
        }
    };

    // Persist every outcome, validation failures included, once per call.
    if let Some(id) = candidate.id {
        if let Err(e) = state
            .store
            .save_test_result(id, outcome.success, &outcome.message)
        {
            tracing::error!("failed to persist test result for config {}: {}", id, e);
        }
    }

    (status, Json(outcome))
}

// ============================================================================
// API: Configuration
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigRequest {
    pub endpoint: String,
    pub username: String,
    pub passhash: String,
    #[serde(default)]
    pub verify_tls: Option<bool>,
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub sensor_field: Option<String>,
}

pub async fn handle_save_config(
    State(state): State<AppState>,
    Json(req): Json<SaveConfigRequest>,
) -> impl IntoResponse {
    let mut config = PrtgConfig {
        endpoint: req.endpoint,
        username: req.username,
        passhash: req.passhash,
        ..Default::default()
    };
    if let Some(verify_tls) = req.verify_tls {
        config.verify_tls = verify_tls;
    }
    if let Some(timeout) = req.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(sensor_field) = req.sensor_field {
        if !sensor_field.trim().is_empty() {
            config.sensor_field = sensor_field.trim().to_string();
        }
    }

    match state.store.save_config(&mut config) {
        Ok(()) => Json(SyncReport::ok("Configuração salva.")).into_response(),
        Err(e) => {
            tracing::error!("failed to save config: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SyncReport::fail("Falha ao salvar a configuração.")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// API: Sync
// ============================================================================

pub async fn handle_sync(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let report = state.sync.sync_by_id(id).await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(report))
}

// ============================================================================
// API: Chart preview
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChartsResponse {
    pub success: bool,
    pub charts: BTreeMap<String, String>,
    pub failed: Vec<String>,
}

impl From<ChartPreview> for ChartsResponse {
    fn from(preview: ChartPreview) -> Self {
        Self {
            success: true,
            charts: preview.charts,
            failed: preview.failed,
        }
    }
}

pub async fn handle_charts(
    State(state): State<AppState>,
    Path((scope, id)): Path<(String, i64)>,
) -> Response {
    match state.sync.fetch_charts_for(&scope, id).await {
        Ok(preview) => Json(ChartsResponse::from(preview)).into_response(),
        Err(e) => {
            let status = match &e {
                PrtgError::Validation(_) | PrtgError::Configuration(_) => StatusCode::BAD_REQUEST,
                PrtgError::NotFound(_) => StatusCode::NOT_FOUND,
                PrtgError::Transport(_) | PrtgError::Protocol { .. } => StatusCode::BAD_GATEWAY,
            };
            (status, Json(SyncReport::fail(e.to_string()))).into_response()
        }
    }
}

// ============================================================================
// API: Sensor records
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSensorRequest {
    #[serde(default)]
    pub sensor_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn handle_create_sensor(
    State(state): State<AppState>,
    Json(req): Json<CreateSensorRequest>,
) -> Response {
    let sensor_id = req.sensor_id.trim().to_string();
    if sensor_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(SyncReport::fail("Sensor ID vazio.")),
        )
            .into_response();
    }

    let mut sensor = SensorRecord {
        sensor_id,
        name: req.name.unwrap_or_default(),
        ..Default::default()
    };

    match state.store.insert_sensor(&mut sensor) {
        Ok(id) => {
            // Best-effort first sync; creation succeeds either way and the
            // record stays recoverable via a manual sync.
            state.sync.clone().spawn_auto_sync(id);
            Json(sensor).into_response()
        }
        Err(e) => {
            tracing::error!("failed to create sensor record: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SyncReport::fail("Falha ao salvar o registro.")),
            )
                .into_response()
        }
    }
}

pub async fn handle_get_sensor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.store.get_sensor(id) {
        Ok(Some(sensor)) => Json(sensor).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(SyncReport::fail("Registro não encontrado.")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("store lookup failed for sensor record {}: {}", id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SyncReport::fail("Falha ao consultar o registro.")),
            )
                .into_response()
        }
    }
}
