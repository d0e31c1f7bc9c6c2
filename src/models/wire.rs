//! Request and response bodies of the remote segmentation service.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::mask::{Mask, MaskError};
use super::prompt::Prompt;

// ============================================================
// Session
// ============================================================

/// Response of `POST /session/init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInitResponse {
    pub session_id: String,
    /// Relative path of the stored image, e.g. `/static/uploads/<id>.png`.
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_dims: Option<Vec<u32>>,
}

// ============================================================
// Text analysis
// ============================================================

/// One entry of the `chat_history` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Body of `POST /analyze/text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextAnalysisRequest {
    pub session_id: String,
    pub text_prompt: String,
    #[serde(default)]
    pub chat_history: Vec<HistoryEntry>,
}

/// Response of the analysis endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Older services omit this; absence means success.
    #[serde(default = "default_true")]
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

// ============================================================
// Point refinement
// ============================================================

/// Interaction kind sent with refinement requests.
pub const POINT_CLICK: &str = "point_click";

/// A prompt as the service expects it: pixel coordinates and a 1/0 label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionPoint {
    pub x: f64,
    pub y: f64,
    pub label: u8,
}

impl From<&Prompt> for InteractionPoint {
    fn from(prompt: &Prompt) -> Self {
        Self {
            x: prompt.position.x,
            y: prompt.position.y,
            label: prompt.label.wire_value(),
        }
    }
}

/// Body of `POST /analyze/interact`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub session_id: String,
    pub interaction_type: String,
    pub points: Vec<InteractionPoint>,
    /// Snapshot version this request was derived from.
    pub version: u64,
}

/// Raster encoding of a mask: base64 of one byte per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskPayload {
    pub width: u32,
    pub height: u32,
    pub data: String,
}

impl MaskPayload {
    pub fn encode(mask: &Mask) -> Self {
        Self {
            width: mask.width(),
            height: mask.height(),
            data: BASE64.encode(mask.pixels()),
        }
    }

    /// Decode into a [`Mask`] tagged with `version`.
    pub fn decode(&self, version: u64) -> Result<Mask, MaskError> {
        let pixels = BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| MaskError::Encoding(e.to_string()))?;
        Mask::new(self.width, self.height, pixels, version)
    }
}

/// Response of `POST /analyze/interact`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementResponse {
    pub mask: MaskPayload,
    /// Echo of the request version; services that omit it get the request's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
