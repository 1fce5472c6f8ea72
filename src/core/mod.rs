//! Core pipeline logic.
//!
//! This module contains:
//! - History: processed-item ledger with atomic replacement
//! - Segmenter: pass-through or split into playable parts
//! - Dispatcher: all-or-nothing delivery of parts
//! - Orchestrator: poll cycles and per-item pipelines
//! - Supervisor: poll loop with error reporting and restarts

pub mod dispatcher;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod segmenter;
pub mod supervisor;

// Re-export commonly used types
pub use dispatcher::Dispatcher;
pub use error::{HistoryError, PipelineError};
pub use history::{History, HistoryStore};
pub use orchestrator::{CycleReport, Orchestrator, Pipeline};
pub use segmenter::{Segmenter, SplitPolicy};
pub use supervisor::{Supervisor, SupervisorOptions};
