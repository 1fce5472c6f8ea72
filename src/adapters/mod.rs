//! Adapter interfaces for external systems.
//!
//! The pipeline only talks to the outside world through these traits:
//! a fetcher that downloads an item, a channel that delivers messages, and
//! a discovery source that lists candidate items.

pub mod telegram;
pub mod youtube;
pub mod ytdlp;

use std::path::Path;

use async_trait::async_trait;

use crate::core::PipelineError;
use crate::domain::{Item, MediaFile};

pub use telegram::TelegramClient;
pub use youtube::YouTubeDiscovery;
pub use ytdlp::YtDlpFetcher;

/// Identifier of a message sent over a channel
pub type MessageId = i64;

/// Downloads an item's media into a working directory
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Human-readable fetcher name
    fn name(&self) -> &str;

    /// Download `item` into `work_dir`, returning the produced file
    async fn fetch(&self, item: &Item, work_dir: &Path) -> Result<MediaFile, PipelineError>;
}

/// Message channel with document upload
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, text: &str) -> Result<MessageId, PipelineError>;

    /// Upload a file, optionally as a reply to an earlier message
    async fn send_document(
        &self,
        path: &Path,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, PipelineError>;
}

/// Source of candidate items
#[async_trait]
pub trait Discovery: Send + Sync {
    /// List the currently visible items, newest first per source
    async fn discover(&self) -> Result<Vec<Item>, PipelineError>;
}
