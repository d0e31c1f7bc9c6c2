//! Domain models for matseg.
//!
//! # Core Concepts
//!
//! ## Session-scoped Entities
//!
//! - [`Session`]: Server-side binding between an uploaded image and the prompts
//!   that refine it. At most one is live per client.
//! - [`Prompt`]: A labeled point hint in native image space. Immutable once created.
//! - [`PromptSnapshot`]: An immutable, versioned view of the live prompts.
//! - [`Mask`]: The service's per-pixel segmentation, tagged with the snapshot
//!   version that produced it.
//!
//! ## Derived and Conversational Entities
//!
//! - [`StatsResult`]: Measurements reduced from a [`Mask`].
//! - [`ChatTurn`]: One entry of the append-only chat log.
//!
//! ## Wire Types
//!
//! Request and response bodies of the remote segmentation service, such as
//! [`InteractionRequest`] and [`MaskPayload`], are re-exported here.

mod chat;
mod mask;
mod prompt;
mod session;
mod wire;

pub use chat::*;
pub use mask::*;
pub use prompt::*;
pub use session::*;
pub use wire::*;
