use serde::{Deserialize, Serialize};

/// A segmentation session bound to one uploaded image.
///
/// Sessions are **ephemeral**: uploading a new image replaces the current
/// session and discards every prompt made against it. Only one session is
/// live per client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque identifier assigned by the service.
    pub id: String,
    /// Server-addressable URL of the uploaded image.
    pub image_url: String,
    pub native_width: u32,
    pub native_height: u32,
    pub state: SessionState,
}

impl Session {
    pub fn native_size(&self) -> ImageSize {
        ImageSize {
            width: self.native_width,
            height: self.native_height,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}

/// Lifecycle state of a session.
///
/// - `Pending`: Upload in flight
/// - `Active`: Upload accepted, prompts may be issued
/// - `Failed`: Upload or validation failed; a fresh upload recovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Active,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

/// Native pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
