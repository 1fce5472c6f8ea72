//! Application context.
//!
//! Everything the commands need is built once from the resolved [`Config`]
//! and passed down explicitly.

use std::sync::Arc;

use anyhow::Result;

use crate::adapters::{Channel, TelegramClient, YouTubeDiscovery, YtDlpFetcher};
use crate::config::Config;
use crate::core::{HistoryStore, Orchestrator, Pipeline, Segmenter, Supervisor, SupervisorOptions};

/// Shared handles built at startup
pub struct AppContext {
    pub config: Config,
    pub telegram: Arc<TelegramClient>,
}

impl AppContext {
    /// Build the context; fails when Telegram is not configured
    pub fn new(config: Config) -> Result<Self> {
        let telegram = Arc::new(TelegramClient::from_config(&config.telegram)?);
        Ok(Self { config, telegram })
    }

    pub fn segmenter(&self) -> Segmenter {
        Segmenter::new(self.config.split)
    }

    /// Single-item pipeline wired to yt-dlp and Telegram
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            Arc::new(YtDlpFetcher::from_config(&self.config.fetcher)),
            self.telegram.clone(),
            self.segmenter(),
            &self.config.downloads_dir,
        )
    }

    /// Poll-cycle orchestrator; fails when YouTube credentials are missing
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let discovery = YouTubeDiscovery::from_config(
            &self.config.youtube,
            self.config.fetcher.default_quality,
        )?;

        Ok(Orchestrator::new(
            Arc::new(discovery),
            HistoryStore::new(&self.config.history_file),
            self.pipeline(),
        )
        .max_concurrent_pipelines(self.config.poller.max_concurrent_pipelines))
    }

    pub fn supervisor(&self) -> Result<Supervisor> {
        let supervisor = Supervisor::new(
            self.orchestrator()?,
            SupervisorOptions::from_config(&self.config),
        );

        Ok(if self.config.telegram.report_errors {
            supervisor.with_reporter(self.telegram.clone() as Arc<dyn Channel>)
        } else {
            supervisor
        })
    }
}
