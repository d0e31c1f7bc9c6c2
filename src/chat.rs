//! Free-text conversation with the remote analysis agent.
//!
//! User turns are appended synchronously, before the request leaves. Agent
//! replies are appended when they arrive, so with several requests in flight
//! the replies follow arrival order rather than request order. The user is
//! never blocked from sending the next turn.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::client::{ClientError, SegmentationService};
use crate::error::TransportError;
use crate::models::*;

/// Session id sent when no image has been uploaded.
pub const FALLBACK_SESSION_ID: &str = "default-chat-session";

/// Shown once when chatting without a session.
pub const TEXT_ONLY_NOTICE: &str =
    "Text-only mode: no image is loaded. Upload an image to enable visual analysis.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("agent reported failure: {0}")]
    Agent(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A chat request that has been logged and is ready to send.
#[derive(Debug, Clone)]
pub struct OutgoingChat {
    pub request_id: u64,
    /// Turns appended by this call: an optional System notice, then the User turn.
    pub turns: Vec<ChatTurn>,
    pub request: TextAnalysisRequest,
}

#[derive(Debug)]
pub struct ChatCompletion {
    pub request_id: u64,
    pub result: Result<AnalysisResponse, ClientError>,
}

#[derive(Debug)]
pub enum ChatOutcome {
    Reply {
        request_id: u64,
        turn: ChatTurn,
        /// Measurements the agent attached, passed through untouched.
        stats: Option<serde_json::Value>,
        mask_url: Option<String>,
    },
    /// The failure was logged as a System turn.
    Failed {
        request_id: u64,
        turn: ChatTurn,
        error: ChatError,
    },
}

impl ChatOutcome {
    pub fn turn(&self) -> &ChatTurn {
        match self {
            Self::Reply { turn, .. } | Self::Failed { turn, .. } => turn,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatOrchestrator {
    log: ChatLog,
    notice_shown: bool,
    next_request_id: u64,
}

impl ChatOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the user's text and build the request for it.
    pub fn send(&mut self, text: &str, session: Option<&Session>) -> Result<OutgoingChat, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }

        let chat_history = self.history();
        let mut turns = Vec::with_capacity(2);

        let session_id = match session {
            Some(session) => {
                self.notice_shown = false;
                session.id.clone()
            }
            None => {
                if !self.notice_shown {
                    self.notice_shown = true;
                    turns.push(self.log.push(Sender::System, TEXT_ONLY_NOTICE));
                }
                FALLBACK_SESSION_ID.to_string()
            }
        };

        turns.push(self.log.push(Sender::User, text));
        self.next_request_id += 1;

        Ok(OutgoingChat {
            request_id: self.next_request_id,
            turns,
            request: TextAnalysisRequest {
                session_id,
                text_prompt: text.to_string(),
                chat_history,
            },
        })
    }

    pub fn on_completion(&mut self, completion: ChatCompletion) -> ChatOutcome {
        let request_id = completion.request_id;
        let error = match completion.result {
            Ok(response) if response.success => {
                let turn = self.log.push(Sender::Agent, response.message);
                return ChatOutcome::Reply {
                    request_id,
                    turn,
                    stats: response.stats,
                    mask_url: response.mask_url,
                };
            }
            Ok(response) => ChatError::Agent(response.message),
            Err(e) => TransportError::new("agent request", e).into(),
        };

        tracing::warn!(request_id, "Chat request failed: {}", error);
        let turn = self.log.push(Sender::System, format!("Agent request failed: {}", error));
        ChatOutcome::Failed {
            request_id,
            turn,
            error,
        }
    }

    /// Append a System turn (session notices, surfaced errors).
    pub fn system(&mut self, text: impl Into<String>) -> ChatTurn {
        self.log.push(Sender::System, text)
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    fn history(&self) -> Vec<HistoryEntry> {
        self.log
            .turns()
            .iter()
            .filter_map(|turn| {
                turn.sender.history_role().map(|role| HistoryEntry {
                    role: role.to_string(),
                    content: turn.text.clone(),
                })
            })
            .collect()
    }
}

/// Send a logged chat request on a background task and report back over `tx`.
pub fn spawn_chat<E>(
    service: Arc<dyn SegmentationService>,
    outgoing: OutgoingChat,
    tx: UnboundedSender<E>,
) -> tokio::task::JoinHandle<()>
where
    E: From<ChatCompletion> + Send + 'static,
{
    tokio::spawn(async move {
        let result = service.analyze_text(&outgoing.request).await;
        let completion = ChatCompletion {
            request_id: outgoing.request_id,
            result,
        };
        if tx.send(completion.into()).is_err() {
            tracing::debug!("Chat receiver dropped");
        }
    })
}
