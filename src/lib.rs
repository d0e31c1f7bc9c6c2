//! Interactive prompt and session orchestration for microstructure
//! segmentation.
//!
//! The UI collaborator feeds clicks and text into a [`workbench::Workbench`]
//! and renders whatever mask, statistics and chat turns it exposes. The
//! remote service is reached through [`client::SegmentationService`].

pub mod chat;
pub mod client;
pub mod config;
pub mod coords;
pub mod error;
pub mod models;
pub mod prompts;
pub mod refine;
pub mod session;
pub mod stats;
pub mod stub;
pub mod workbench;
