//! Per-item pipeline run state.
//!
//! A run walks strictly forward through
//! `Discovered → Announced → Fetched → Segmented → Delivered → CleanedUp`.
//! Any step may instead move it to the terminal `Failed` state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::item::ItemId;

/// State of one item's pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PipelineState {
    /// Found by discovery and absent from history
    Discovered,

    /// Announcement message sent
    Announced { message_id: i64 },

    /// Media downloaded
    Fetched,

    /// Media split (or passed through) into parts
    Segmented { parts: usize },

    /// Every part confirmed sent
    Delivered,

    /// Local files removed
    CleanedUp,

    /// Terminal failure
    Failed { error: String },
}

impl PipelineState {
    /// Position in the forward order; `Failed` has none
    fn ordinal(&self) -> Option<u8> {
        match self {
            Self::Discovered => Some(0),
            Self::Announced { .. } => Some(1),
            Self::Fetched => Some(2),
            Self::Segmented { .. } => Some(3),
            Self::Delivered => Some(4),
            Self::CleanedUp => Some(5),
            Self::Failed { .. } => None,
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CleanedUp | Self::Failed { .. })
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Announced { .. } => "announced",
            Self::Fetched => "fetched",
            Self::Segmented { .. } => "segmented",
            Self::Delivered => "delivered",
            Self::CleanedUp => "cleaned_up",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, Error)]
#[error("Invalid pipeline transition: {from} → {to}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub to: &'static str,
}

/// Tracks one item's progress through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Pipeline-scoped identifier (also namespaces the working directory)
    pub id: Uuid,

    /// Item being processed
    pub item_id: ItemId,

    /// Current state
    pub state: PipelineState,

    /// When the pipeline was started
    pub started_at: DateTime<Utc>,

    /// When the pipeline reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Start tracking a newly discovered item
    pub fn new(item_id: ItemId) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            state: PipelineState::Discovered,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to the next state.
    ///
    /// Only the immediate successor or `Failed` is accepted, and nothing
    /// leaves a terminal state.
    pub fn advance(&mut self, next: PipelineState) -> Result<(), InvalidTransition> {
        let invalid = || InvalidTransition {
            from: self.state.label(),
            to: next.label(),
        };

        if self.state.is_terminal() {
            return Err(invalid());
        }

        let allowed = match (self.state.ordinal(), next.ordinal()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        };
        if !allowed {
            return Err(invalid());
        }

        self.state = next;
        if self.state.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record a failure, regardless of the current state
    pub fn fail(&mut self, error: impl Into<String>) {
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed {
                error: error.into(),
            };
            self.finished_at = Some(Utc::now());
        }
    }

    /// Name of the per-pipeline working directory
    pub fn work_dir_name(&self) -> String {
        format!("{}-{}", self.item_id, self.id.simple())
    }
}
