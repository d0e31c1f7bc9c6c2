use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A point in native image-pixel space.
///
/// Coordinates are sub-pixel: `(0.0, 0.0)` is the top-left corner of the
/// first pixel and valid points satisfy `0 <= x < width`, `0 <= y < height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Whether a prompt marks foreground or background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptLabel {
    Positive,
    Negative,
}

impl PromptLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "positive" | "pos" | "+" | "fg" => Some(Self::Positive),
            "negative" | "neg" | "-" | "bg" => Some(Self::Negative),
            _ => None,
        }
    }

    /// Integer label used on the wire: 1 for foreground, 0 for background.
    pub fn wire_value(&self) -> u8 {
        match self {
            Self::Positive => 1,
            Self::Negative => 0,
        }
    }
}

/// A labeled spatial hint fed to the segmentation service.
///
/// Prompts are immutable. Removing one from a [`PromptStore`](crate::prompts::PromptStore)
/// tombstones it, so the sequence history stays intact for debugging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub position: ImagePoint,
    pub label: PromptLabel,
    /// Monotonic within a session, starting at 1.
    pub sequence: u64,
}

/// An immutable, ordered view of the live prompts, tagged with a version.
///
/// Every add or remove on the store yields a new snapshot with a strictly
/// greater version. Cloning is cheap; the prompt list is shared.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSnapshot {
    version: u64,
    prompts: Arc<Vec<Prompt>>,
}

impl PromptSnapshot {
    pub(crate) fn new(version: u64, prompts: Vec<Prompt>) -> Self {
        Self {
            version,
            prompts: Arc::new(prompts),
        }
    }

    /// The empty snapshot every session starts from.
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
