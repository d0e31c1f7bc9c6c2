//! Ordered, versioned store of point prompts.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::models::{ImagePoint, Prompt, PromptLabel, PromptSnapshot};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("no live prompt with sequence number {0}")]
    NotFound(u64),
}

/// Accumulates prompts for the current session.
///
/// Every mutation bumps the version and produces a fresh [`PromptSnapshot`];
/// the version therefore always equals the number of mutations since the last
/// [`clear`](Self::clear). Removed prompts are tombstoned, not erased.
#[derive(Debug, Default)]
pub struct PromptStore {
    prompts: Vec<Prompt>,
    removed: BTreeSet<u64>,
    version: u64,
    current: Option<PromptSnapshot>,
}

impl PromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prompt and return the new snapshot.
    pub fn add_point(&mut self, position: ImagePoint, label: PromptLabel) -> PromptSnapshot {
        let sequence = self.prompts.len() as u64 + 1;
        self.prompts.push(Prompt {
            position,
            label,
            sequence,
        });
        self.bump()
    }

    /// Tombstone the live prompt with the given sequence number.
    pub fn remove(&mut self, sequence: u64) -> Result<PromptSnapshot, PromptError> {
        let exists = sequence >= 1 && sequence <= self.prompts.len() as u64;
        if !exists || !self.removed.insert(sequence) {
            return Err(PromptError::NotFound(sequence));
        }
        Ok(self.bump())
    }

    /// Tombstone the most recent live prompt, if any.
    pub fn undo_last(&mut self) -> Option<PromptSnapshot> {
        let sequence = self
            .prompts
            .iter()
            .rev()
            .map(|p| p.sequence)
            .find(|seq| !self.removed.contains(seq))?;
        self.remove(sequence).ok()
    }

    /// Drop everything and restart version and sequence space at 0.
    pub fn clear(&mut self) -> PromptSnapshot {
        self.prompts.clear();
        self.removed.clear();
        self.version = 0;
        self.current = None;
        PromptSnapshot::empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> PromptSnapshot {
        self.current.clone().unwrap_or_else(PromptSnapshot::empty)
    }

    /// Every prompt ever added since the last clear, with its tombstone flag.
    pub fn history(&self) -> Vec<(Prompt, bool)> {
        self.prompts
            .iter()
            .map(|p| (*p, self.removed.contains(&p.sequence)))
            .collect()
    }

    fn bump(&mut self) -> PromptSnapshot {
        self.version += 1;
        let live = self
            .prompts
            .iter()
            .filter(|p| !self.removed.contains(&p.sequence))
            .copied()
            .collect();
        let snapshot = PromptSnapshot::new(self.version, live);
        self.current = Some(snapshot.clone());
        snapshot
    }
}
