//! Domain types for ytrelay.
//!
//! This module contains the core data structures:
//! - Item: discovered content and its identifier
//! - Media: downloaded files and the parts derived from them
//! - Run: per-item pipeline state

pub mod item;
pub mod media;
pub mod run;

// Re-export commonly used types
pub use item::{Item, ItemId, Quality};
pub use media::{MediaFile, SegmentPart};
pub use run::{InvalidTransition, PipelineRun, PipelineState};
