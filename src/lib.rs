//! ytrelay - Relay new YouTube subscription uploads to a Telegram chat
//!
//! Polls the authenticated account's subscriptions, downloads every upload
//! it has not seen before with yt-dlp and posts it to a Telegram chat.
//! Files too large for a single upload are split into standalone
//! fragmented MP4 parts, cut on keyframes, without re-encoding.
//!
//! # Modules
//!
//! - `adapters`: External system integrations (YouTube, yt-dlp, Telegram)
//! - `core`: Orchestration logic (History, Segmenter, Dispatcher, Supervisor)
//! - `domain`: Data structures (Item, MediaFile, PipelineRun)
//! - `media`: MP4 parsing and part serialization
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Poll forever
//! ytrelay run
//!
//! # Deliver one video in 720p
//! ytrelay send https://youtu.be/dQw4w9WgXcQ --hd
//! ```

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod media;

// Re-export main types at crate root for convenience
pub use app::AppContext;
pub use config::Config;
pub use core::{Orchestrator, Pipeline, PipelineError, Segmenter, SplitPolicy};
pub use domain::{Item, ItemId, MediaFile, PipelineRun, PipelineState, Quality, SegmentPart};
