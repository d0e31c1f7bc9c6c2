//! Error taxonomy shared across the orchestration layer.
//!
//! Only [`SessionError`] is fatal to anything, and only to the current
//! session. Everything else is recoverable and ends up as a System chat turn
//! at the [`Workbench`](crate::workbench::Workbench) boundary.

use thiserror::Error;

use crate::chat::ChatError;
use crate::client::ClientError;
use crate::coords::CoordinateError;
use crate::prompts::PromptError;
use crate::session::SessionError;

/// An operation needed a live session and there was none.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no active session: upload an image first")]
pub struct NoActiveSessionError;

/// A network or service failure on refinement or chat. Never retried
/// automatically.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct TransportError {
    pub operation: &'static str,
    #[source]
    pub source: ClientError,
}

impl TransportError {
    pub fn new(operation: &'static str, source: ClientError) -> Self {
        Self { operation, source }
    }
}

/// Anything a [`Workbench`](crate::workbench::Workbench) call can reject.
#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error(transparent)]
    NoActiveSession(#[from] NoActiveSessionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}
