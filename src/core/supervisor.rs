//! Poll loop supervision.
//!
//! Runs poll cycles on a fixed interval. A failed cycle is logged and
//! reported to the operator chat; the supervisor then either gives up
//! (the default, leaving restarts to an external service manager) or
//! waits and starts polling again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::adapters::Channel;
use crate::config::Config;

use super::orchestrator::Orchestrator;

/// Timing and restart policy
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Pause between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Fatal errors tolerated before giving up
    pub max_restarts: u32,
    pub restart_delay: Duration,
}

impl SupervisorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.poller.interval_secs),
            max_restarts: config.supervisor.max_restarts,
            restart_delay: Duration::from_secs(config.supervisor.restart_delay_secs),
        }
    }
}

pub struct Supervisor {
    orchestrator: Orchestrator,
    reporter: Option<Arc<dyn Channel>>,
    options: SupervisorOptions,
}

impl Supervisor {
    pub fn new(orchestrator: Orchestrator, options: SupervisorOptions) -> Self {
        Self {
            orchestrator,
            reporter: None,
            options,
        }
    }

    /// Send fatal errors to this channel before acting on them
    pub fn with_reporter(mut self, reporter: Arc<dyn Channel>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Poll until a fatal error exhausts the restart budget
    pub async fn run(&self) -> Result<()> {
        let mut restarts = 0u32;

        loop {
            let err = match self.poll_loop().await {
                Ok(never) => match never {},
                Err(e) => e,
            };

            error!(error = %format!("{:#}", err), restarts, "Poller stopped");
            self.report("while polling", &err).await;

            if restarts >= self.options.max_restarts {
                return Err(err);
            }
            restarts += 1;

            warn!(
                restart = restarts,
                max_restarts = self.options.max_restarts,
                delay_secs = self.options.restart_delay.as_secs(),
                "Restarting poller"
            );
            tokio::time::sleep(self.options.restart_delay).await;
        }
    }

    async fn poll_loop(&self) -> Result<std::convert::Infallible> {
        loop {
            let report = self
                .orchestrator
                .run_cycle()
                .await
                .context("Poll cycle failed")?;
            info!(
                discovered = report.discovered,
                started = report.started.len(),
                "Poll cycle complete"
            );
            tokio::time::sleep(self.options.interval).await;
        }
    }

    /// Best-effort `Error <context>: <error>` to the operator chat
    pub async fn report(&self, context: &str, err: &anyhow::Error) {
        let Some(reporter) = &self.reporter else {
            return;
        };

        let text = format!("Error {}: {:#}", context, err);
        if let Err(e) = reporter.send_text(&text).await {
            warn!(error = %e, "Failed to report error to chat");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Discovery, Fetcher, MessageId};
    use crate::core::{HistoryStore, Pipeline, PipelineError, Segmenter};
    use crate::domain::{Item, MediaFile};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct BrokenDiscovery {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Discovery for BrokenDiscovery {
        async fn discover(&self) -> Result<Vec<Item>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Discovery("quota exceeded".to_string()))
        }
    }

    struct NoFetcher;

    #[async_trait]
    impl Fetcher for NoFetcher {
        fn name(&self) -> &str {
            "none"
        }

        async fn fetch(&self, item: &Item, _work_dir: &Path) -> Result<MediaFile, PipelineError> {
            Err(PipelineError::NotFound(item.id.to_string()))
        }
    }

    #[derive(Default)]
    struct TextLog {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Channel for TextLog {
        async fn send_text(&self, text: &str) -> Result<MessageId, PipelineError> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(1)
        }

        async fn send_document(
            &self,
            _path: &Path,
            _reply_to: Option<MessageId>,
        ) -> Result<MessageId, PipelineError> {
            Ok(2)
        }
    }

    fn supervisor(dir: &TempDir, max_restarts: u32) -> (Supervisor, Arc<BrokenDiscovery>, Arc<TextLog>) {
        let discovery = Arc::new(BrokenDiscovery {
            calls: AtomicUsize::new(0),
        });
        let chat = Arc::new(TextLog::default());
        let pipeline = Pipeline::new(
            Arc::new(NoFetcher),
            chat.clone(),
            Segmenter::default(),
            dir.path().join("downloads"),
        );
        let orchestrator = Orchestrator::new(
            discovery.clone(),
            HistoryStore::new(dir.path().join("history")),
            pipeline,
        );
        let options = SupervisorOptions {
            interval: Duration::from_millis(1),
            max_restarts,
            restart_delay: Duration::from_millis(1),
        };
        let supervisor = Supervisor::new(orchestrator, options).with_reporter(chat.clone());
        (supervisor, discovery, chat)
    }

    #[tokio::test]
    async fn test_fatal_error_is_reported_then_returned() {
        let dir = TempDir::new().unwrap();
        let (supervisor, discovery, chat) = supervisor(&dir, 0);

        let err = supervisor.run().await.unwrap_err();

        assert!(format!("{:#}", err).contains("quota exceeded"));
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
        let texts = chat.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Error while polling: "));
    }

    #[tokio::test]
    async fn test_restarts_until_budget_is_spent() {
        let dir = TempDir::new().unwrap();
        let (supervisor, discovery, chat) = supervisor(&dir, 2);

        assert!(supervisor.run().await.is_err());
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 3);
        assert_eq!(chat.texts.lock().unwrap().len(), 3);
    }
}
