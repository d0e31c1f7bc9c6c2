//! Session lifecycle: none → pending → active, or failed until the next upload.

use std::io::Cursor;

use image::ImageReader;
use thiserror::Error;

use crate::client::{ClientError, SegmentationService};
use crate::error::NoActiveSessionError;
use crate::models::{ImageSize, Session, SessionState};

/// Upload or validation failure. Fatal to the session, never to the process;
/// the operator recovers by uploading again.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("image is empty")]
    EmptyImage,

    #[error("image could not be decoded: {0}")]
    Undecodable(String),

    #[error("image has no pixels ({width}x{height})")]
    ZeroSized { width: u32, height: u32 },

    #[error("upload failed: {0}")]
    Upload(#[from] ClientError),
}

impl SessionError {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Read the native dimensions from the image header without decoding pixels.
pub fn probe_dimensions(bytes: &[u8]) -> Result<ImageSize, SessionError> {
    if bytes.is_empty() {
        return Err(SessionError::EmptyImage);
    }

    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| SessionError::Undecodable(e.to_string()))?
        .into_dimensions()
        .map_err(|e| SessionError::Undecodable(e.to_string()))?;

    if width == 0 || height == 0 {
        return Err(SessionError::ZeroSized { width, height });
    }
    Ok(ImageSize::new(width, height))
}

/// Owns the single live session of this client.
#[derive(Debug, Default)]
pub struct SessionManager {
    session: Option<Session>,
    state: Option<SessionState>,
    last_error: Option<String>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload an image and make it the active session.
    ///
    /// Any previous session is invalidated before the upload starts, whether
    /// or not the new one succeeds.
    pub async fn init_session(
        &mut self,
        service: &dyn SegmentationService,
        file_name: &str,
        image: Vec<u8>,
    ) -> Result<Session, SessionError> {
        if let Some(old) = self.session.take() {
            tracing::info!(session_id = %old.id, "Replacing session");
        }
        self.state = Some(SessionState::Pending);
        self.last_error = None;

        match Self::establish(service, file_name, image).await {
            Ok(session) => {
                tracing::info!(
                    session_id = %session.id,
                    width = session.native_width,
                    height = session.native_height,
                    "Session active"
                );
                self.state = Some(SessionState::Active);
                self.session = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                tracing::warn!("Session init failed: {}", e);
                self.state = Some(SessionState::Failed);
                self.last_error = Some(e.reason());
                Err(e)
            }
        }
    }

    async fn establish(
        service: &dyn SegmentationService,
        file_name: &str,
        image: Vec<u8>,
    ) -> Result<Session, SessionError> {
        let size = probe_dimensions(&image)?;
        let response = service.init_session(file_name, image).await?;

        if response.session_id.trim().is_empty() {
            return Err(ClientError::Malformed("empty session_id".to_string()).into());
        }

        Ok(Session {
            id: response.session_id,
            image_url: service.resolve_url(&response.image_url),
            native_width: size.width,
            native_height: size.height,
            state: SessionState::Active,
        })
    }

    /// The live session, if one is active.
    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn require(&self) -> Result<&Session, NoActiveSessionError> {
        self.current().ok_or(NoActiveSessionError)
    }

    /// `None` until the first upload starts.
    pub fn state(&self) -> Option<SessionState> {
        self.state
    }

    /// Reason of the most recent failed upload.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
