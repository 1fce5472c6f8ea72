//! Poll-cycle orchestration.
//!
//! One cycle loads the history, asks discovery for the current items,
//! starts a pipeline for every item not seen before, commits the history
//! and then waits for the pipelines. A pipeline walks one item through
//! announce → fetch → segment → deliver → clean up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{Channel, Discovery, Fetcher};
use crate::domain::{Item, ItemId, PipelineRun, PipelineState};

use super::dispatcher::Dispatcher;
use super::error::PipelineError;
use super::history::HistoryStore;
use super::segmenter::Segmenter;

/// Default cap on pipelines running at once
pub const DEFAULT_MAX_CONCURRENT_PIPELINES: usize = 4;

/// Runs a single item through the pipeline
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn Fetcher>,
    channel: Arc<dyn Channel>,
    segmenter: Segmenter,
    dispatcher: Dispatcher,
    downloads_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        channel: Arc<dyn Channel>,
        segmenter: Segmenter,
        downloads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            dispatcher: Dispatcher::new(channel.clone()),
            channel,
            segmenter,
            downloads_dir: downloads_dir.into(),
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Process `item`, announcing it with `announcement` (its URL when `None`).
    ///
    /// Returns the finished run; on error the run is logged as failed and
    /// the error propagates.
    #[instrument(skip(self, item, announcement), fields(item = %item.id))]
    pub async fn run(&self, item: Item, announcement: Option<String>) -> Result<PipelineRun, PipelineError> {
        let mut run = PipelineRun::new(item.id.clone());
        info!(run_id = %run.id, "Pipeline started");

        match self.drive(&item, announcement, &mut run).await {
            Ok(()) => {
                info!(run_id = %run.id, "Pipeline finished");
                Ok(run)
            }
            Err(e) => {
                run.fail(e.to_string());
                error!(run_id = %run.id, error = %e, "Pipeline failed");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        item: &Item,
        announcement: Option<String>,
        run: &mut PipelineRun,
    ) -> Result<(), PipelineError> {
        let text = announcement.unwrap_or_else(|| item.url.clone());
        let message_id = self.channel.send_text(&text).await?;
        advance(run, PipelineState::Announced { message_id })?;

        let work_dir = self.downloads_dir.join(run.work_dir_name());
        let file = self.fetcher.fetch(item, &work_dir).await?;
        debug!(fetcher = self.fetcher.name(), path = %file.path.display(), size = file.size, "Media fetched");
        advance(run, PipelineState::Fetched)?;

        let parts = self.segmenter.segment(file).await?;
        advance(run, PipelineState::Segmented { parts: parts.len() })?;

        self.dispatcher.deliver(message_id, &parts).await?;
        advance(run, PipelineState::Delivered)?;

        match tokio::fs::remove_dir_all(&work_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        advance(run, PipelineState::CleanedUp)?;

        Ok(())
    }
}

fn advance(run: &mut PipelineRun, next: PipelineState) -> Result<(), PipelineError> {
    run.advance(next)?;
    debug!(item = %run.item_id, state = run.state.label(), "Transition");
    Ok(())
}

/// Summary of one poll cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Items returned by discovery
    pub discovered: usize,
    /// Items a pipeline was started for
    pub started: Vec<ItemId>,
    /// Finished runs, in completion order
    pub completed: Vec<PipelineRun>,
}

/// Main poll-cycle orchestrator
pub struct Orchestrator {
    discovery: Arc<dyn Discovery>,
    history: HistoryStore,
    pipeline: Pipeline,
    max_concurrent: usize,
}

impl Orchestrator {
    pub fn new(discovery: Arc<dyn Discovery>, history: HistoryStore, pipeline: Pipeline) -> Self {
        Self {
            discovery,
            history,
            pipeline,
            max_concurrent: DEFAULT_MAX_CONCURRENT_PIPELINES,
        }
    }

    /// Cap the number of pipelines running at once
    pub fn max_concurrent_pipelines(mut self, limit: usize) -> Self {
        self.max_concurrent = limit.max(1);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run one poll cycle.
    ///
    /// The history is committed after every new item's pipeline has been
    /// started and before any of them is awaited. The first pipeline error
    /// aborts the pipelines still in flight and is returned.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let mut history = self.history.load().await?;
        let items = self.discovery.discover().await?;

        let mut report = CycleReport {
            discovered: items.len(),
            ..Default::default()
        };

        let new_ids = history.merge(items.iter().map(|item| &item.id));
        if new_ids.is_empty() {
            debug!(discovered = report.discovered, "Nothing new");
            return Ok(report);
        }
        info!(discovered = report.discovered, new = new_ids.len(), "New items found");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for id in &new_ids {
            let Some(item) = items.iter().find(|item| &item.id == id).cloned() else {
                continue;
            };
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
                pipeline.run(item, None).await
            });
            report.started.push(id.clone());
        }

        // Dropping the JoinSet on error aborts every pipeline
        self.history.commit(&history).await?;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(run)) => report.completed.push(run),
                Ok(Err(e)) => {
                    warn!(remaining = tasks.len(), "Aborting remaining pipelines");
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    tasks.abort_all();
                    return Err(PipelineError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        e,
                    )));
                }
            }
        }

        info!(completed = report.completed.len(), "Cycle finished");
        Ok(report)
    }
}
