//! The single-owner facade the UI collaborator talks to.
//!
//! A [`Workbench`] owns the session, the prompts, the displayed mask and the
//! chat log. Remote calls run as background tasks that only report back over
//! a channel; their results are applied when the owner pulls them with
//! [`next_update`](Workbench::next_update). All state is therefore mutated
//! from one place, one event at a time, and needs no locks.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::chat::{spawn_chat, ChatCompletion, ChatOrchestrator, ChatOutcome};
use crate::client::{SegmentationClient, SegmentationService};
use crate::config::Config;
use crate::coords::{CanvasSize, CoordinateError, CoordinateMapper, DisplayPoint};
use crate::error::{NoActiveSessionError, WorkbenchError};
use crate::models::*;
use crate::prompts::PromptStore;
use crate::refine::{
    spawn_refinement, RefinementCompletion, RefinementOrchestrator, RefinementOutcome,
};
use crate::session::SessionManager;
use crate::stats::StatsReducer;

/// Mouse button of a raw canvas click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Left,
    Right,
}

impl PointerButton {
    /// Map a DOM-style button code (0 = left, 2 = right).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Left),
            2 => Some(Self::Right),
            _ => None,
        }
    }

    /// Left click adds foreground, right click excludes.
    pub fn label(&self) -> PromptLabel {
        match self {
            Self::Left => PromptLabel::Positive,
            Self::Right => PromptLabel::Negative,
        }
    }
}

/// A raw pointer click in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerClick {
    pub position: DisplayPoint,
    pub button: PointerButton,
}

/// Completion of a background call, waiting to be applied.
#[derive(Debug)]
pub enum WorkbenchEvent {
    Refinement(RefinementCompletion),
    Chat(ChatCompletion),
}

impl From<RefinementCompletion> for WorkbenchEvent {
    fn from(completion: RefinementCompletion) -> Self {
        Self::Refinement(completion)
    }
}

impl From<ChatCompletion> for WorkbenchEvent {
    fn from(completion: ChatCompletion) -> Self {
        Self::Chat(completion)
    }
}

/// What changed after applying one event, for the rendering collaborator.
#[derive(Debug)]
pub enum Update {
    Refinement {
        outcome: RefinementOutcome,
        /// System turn logged for a surfaced failure.
        notice: Option<ChatTurn>,
    },
    Chat(ChatOutcome),
}

pub struct Workbench {
    service: Arc<dyn SegmentationService>,
    debounce: Duration,
    sessions: SessionManager,
    prompts: PromptStore,
    refinement: RefinementOrchestrator,
    chat: ChatOrchestrator,
    tx: UnboundedSender<WorkbenchEvent>,
    rx: UnboundedReceiver<WorkbenchEvent>,
}

impl Workbench {
    /// A `config` that fails [`Config::validate`] falls back to the default
    /// statistics settings.
    pub fn new(service: Arc<dyn SegmentationService>, config: &Config) -> Self {
        let reducer = config.stats_reducer().unwrap_or_else(|e| {
            tracing::warn!("Invalid statistics settings, using defaults: {}", e);
            StatsReducer::default()
        });
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            service,
            debounce: config.debounce(),
            sessions: SessionManager::new(),
            prompts: PromptStore::new(),
            refinement: RefinementOrchestrator::new(reducer),
            chat: ChatOrchestrator::new(),
            tx,
            rx,
        }
    }

    /// Workbench talking HTTP to the service named in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(SegmentationClient::from_config(config)), config)
    }

    // ============================================================
    // Session
    // ============================================================

    /// Upload an image and start a fresh session on it.
    ///
    /// Prompts and the displayed mask of the previous session are dropped
    /// before the upload starts. The outcome is also logged as a System turn.
    pub async fn upload_image(
        &mut self,
        file_name: &str,
        image: Vec<u8>,
    ) -> Result<Session, WorkbenchError> {
        self.prompts.clear();
        self.refinement.detach();

        match self
            .sessions
            .init_session(self.service.as_ref(), file_name, image)
            .await
        {
            Ok(session) => {
                self.refinement.reset(&session);
                self.chat.system(format!(
                    "Image uploaded ({}x{}), session {}. Click to add prompts or ask a question.",
                    session.native_width, session.native_height, session.id
                ));
                Ok(session)
            }
            Err(e) => {
                self.chat
                    .system(format!("Image upload or session init failed: {}", e));
                Err(e.into())
            }
        }
    }

    // ============================================================
    // Prompts
    // ============================================================

    /// Turn a canvas click into a prompt and issue a refinement for it.
    pub fn click(
        &mut self,
        click: PointerClick,
        canvas: CanvasSize,
    ) -> Result<PromptSnapshot, WorkbenchError> {
        let session = self.sessions.require()?;
        let point = CoordinateMapper::new(canvas, session.native_size())?.to_image(click.position)?;
        self.add_point(point, click.button.label())
    }

    /// Add a prompt already in image space.
    pub fn add_point(
        &mut self,
        point: ImagePoint,
        label: PromptLabel,
    ) -> Result<PromptSnapshot, WorkbenchError> {
        let size = self.sessions.require()?.native_size();
        let inside = point.x >= 0.0
            && point.y >= 0.0
            && point.x < size.width as f64
            && point.y < size.height as f64;
        if !inside {
            return Err(CoordinateError::OutsideImage {
                x: point.x,
                y: point.y,
            }
            .into());
        }

        let snapshot = self.prompts.add_point(point, label);
        self.issue(&snapshot);
        Ok(snapshot)
    }

    pub fn remove_prompt(&mut self, sequence: u64) -> Result<PromptSnapshot, WorkbenchError> {
        self.sessions.require()?;
        let snapshot = self.prompts.remove(sequence)?;
        self.issue(&snapshot);
        Ok(snapshot)
    }

    /// Remove the most recent live prompt.
    pub fn undo(&mut self) -> Result<Option<PromptSnapshot>, WorkbenchError> {
        self.sessions.require()?;
        let snapshot = self.prompts.undo_last();
        if let Some(ref snapshot) = snapshot {
            self.issue(snapshot);
        }
        Ok(snapshot)
    }

    fn issue(&mut self, snapshot: &PromptSnapshot) {
        if let Some(request) = self.refinement.on_snapshot(snapshot) {
            spawn_refinement(
                self.service.clone(),
                request,
                self.debounce,
                self.tx.clone(),
            );
        }
    }

    // ============================================================
    // Chat
    // ============================================================

    /// Log the text as a User turn and send it to the agent.
    ///
    /// Returns the turns appended synchronously. The Agent reply arrives
    /// later through [`next_update`](Self::next_update).
    pub fn send_text(&mut self, text: &str) -> Result<Vec<ChatTurn>, WorkbenchError> {
        let outgoing = self.chat.send(text, self.sessions.current())?;
        let turns = outgoing.turns.clone();
        spawn_chat(self.service.clone(), outgoing, self.tx.clone());
        Ok(turns)
    }

    // ============================================================
    // Events
    // ============================================================

    /// Wait for the next background completion and apply it.
    pub async fn next_update(&mut self) -> Option<Update> {
        let event = self.rx.recv().await?;
        Some(self.apply(event))
    }

    /// Apply a completion if one is already waiting.
    pub fn try_next_update(&mut self) -> Option<Update> {
        let event = self.rx.try_recv().ok()?;
        Some(self.apply(event))
    }

    pub fn apply(&mut self, event: WorkbenchEvent) -> Update {
        match event {
            WorkbenchEvent::Refinement(completion) => {
                let outcome = self.refinement.on_completion(completion);
                let notice = match &outcome {
                    RefinementOutcome::Failed {
                        error,
                        surfaced: true,
                        ..
                    } => Some(self.chat.system(format!(
                        "Segmentation update failed: {}. Add or remove a point to try again.",
                        error
                    ))),
                    _ => None,
                };
                Update::Refinement { outcome, notice }
            }
            WorkbenchEvent::Chat(completion) => Update::Chat(self.chat.on_completion(completion)),
        }
    }

    // ============================================================
    // Views for the rendering collaborator
    // ============================================================

    pub fn session(&self) -> Option<&Session> {
        self.sessions.current()
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.sessions.state()
    }

    pub fn prompts(&self) -> PromptSnapshot {
        self.prompts.snapshot()
    }

    /// All prompts since the session started, with their removed flag.
    pub fn prompt_history(&self) -> Vec<(Prompt, bool)> {
        self.prompts.history()
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.refinement.mask()
    }

    pub fn stats(&self) -> Option<&StatsResult> {
        self.refinement.stats()
    }

    /// Areas of the counted objects in the displayed mask, largest first.
    pub fn object_areas(&self) -> Vec<f64> {
        self.refinement
            .mask()
            .map(|mask| self.refinement.reducer().object_areas(mask))
            .unwrap_or_default()
    }

    pub fn chat_log(&self) -> &ChatLog {
        self.chat.log()
    }

    /// Where an image-space point lands on the canvas, for overlay markers.
    pub fn to_display_space(
        &self,
        point: ImagePoint,
        canvas: CanvasSize,
    ) -> Result<DisplayPoint, WorkbenchError> {
        let session = self.sessions.current().ok_or(NoActiveSessionError)?;
        Ok(CoordinateMapper::new(canvas, session.native_size())?.to_display(point))
    }

    pub fn last_applied_version(&self) -> u64 {
        self.refinement.last_applied_version()
    }
}
