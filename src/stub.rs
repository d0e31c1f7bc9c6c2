//! Deterministic stand-in for the segmentation service.
//!
//! Implements the same HTTP contract as the real service so the client can be
//! developed and tested offline. There is no model behind it: a refinement
//! paints a disk around every positive point and carves out a disk around
//! every negative point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::models::*;
use crate::session::probe_dimensions;

/// Disk radius as a fraction of the image's shorter side.
pub const DEFAULT_BRUSH_FRACTION: f64 = 0.1;

#[derive(Clone)]
pub struct StubState {
    sessions: Arc<Mutex<HashMap<String, ImageSize>>>,
    brush_fraction: f64,
}

impl Default for StubState {
    fn default() -> Self {
        Self::new(DEFAULT_BRUSH_FRACTION)
    }
}

impl StubState {
    pub fn new(brush_fraction: f64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            brush_fraction,
        }
    }

    fn session_size(&self, id: &str) -> Option<ImageSize> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(id).copied()
    }

    fn insert(&self, id: String, size: ImageSize) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(id, size);
    }
}

pub fn create_router(state: StubState) -> Router {
    let api = Router::new()
        .route("/session/init", post(init_session))
        .route("/analyze/text", post(analyze_text))
        .route("/analyze/interact", post(analyze_interact))
        .route("/health", get(health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the stub on `listener` until the process exits.
pub async fn serve(listener: tokio::net::TcpListener, state: StubState) -> std::io::Result<()> {
    axum::serve(listener, create_router(state)).await
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, String) {
    let msg = msg.into();
    tracing::warn!("Rejected request: {}", msg);
    (StatusCode::BAD_REQUEST, msg)
}

// ============================================================
// Handlers
// ============================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn init_session(
    State(state): State<StubState>,
    mut multipart: Multipart,
) -> Result<Json<SessionInitResponse>, (StatusCode, String)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let extension = field
            .file_name()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| format!(".{}", ext))
            .unwrap_or_default();
        let bytes = field.bytes().await.map_err(|e| bad_request(e.to_string()))?;
        let size = probe_dimensions(&bytes).map_err(|e| bad_request(e.to_string()))?;

        let session_id = Uuid::new_v4().to_string();
        state.insert(session_id.clone(), size);
        tracing::info!(%session_id, width = size.width, height = size.height, "Stub session created");

        return Ok(Json(SessionInitResponse {
            image_url: format!("/static/uploads/{}{}", session_id, extension),
            image_dims: Some(vec![size.width, size.height]),
            session_id,
        }));
    }

    Err(bad_request("missing multipart field 'file'"))
}

async fn analyze_text(
    State(state): State<StubState>,
    Json(request): Json<TextAnalysisRequest>,
) -> Json<AnalysisResponse> {
    let message = match state.session_size(&request.session_id) {
        Some(size) => format!(
            "Stub agent received \"{}\" for a {}x{} image ({} earlier turns).",
            request.text_prompt,
            size.width,
            size.height,
            request.chat_history.len()
        ),
        None => format!(
            "Stub agent received \"{}\" without an image ({} earlier turns).",
            request.text_prompt,
            request.chat_history.len()
        ),
    };

    Json(AnalysisResponse {
        success: true,
        message,
        mask_url: None,
        stats: None,
    })
}

async fn analyze_interact(
    State(state): State<StubState>,
    Json(request): Json<InteractionRequest>,
) -> Result<Json<RefinementResponse>, (StatusCode, String)> {
    let size = state
        .session_size(&request.session_id)
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;
    if request.points.is_empty() {
        return Err(bad_request("no interaction points provided"));
    }

    let mask = paint(size, &request.points, state.brush_fraction, request.version)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(RefinementResponse {
        mask: MaskPayload::encode(&mask),
        version: Some(request.version),
        message: Some("Segmentation updated from your clicks.".to_string()),
    }))
}

/// Union of disks around positive points minus disks around negative points.
pub fn paint(
    size: ImageSize,
    points: &[InteractionPoint],
    brush_fraction: f64,
    version: u64,
) -> Result<Mask, MaskError> {
    let radius = size.width.min(size.height) as f64 * brush_fraction;
    let r2 = radius * radius;

    Mask::from_fn(size.width, size.height, version, |x, y| {
        let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
        let hit = |p: &InteractionPoint| (p.x - cx).powi(2) + (p.y - cy).powi(2) <= r2;

        let positive = points.iter().any(|p| p.label == 1 && hit(p));
        let negative = points.iter().any(|p| p.label == 0 && hit(p));
        positive && !negative
    })
}
