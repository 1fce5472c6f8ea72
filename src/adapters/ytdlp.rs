//! yt-dlp fetcher.
//!
//! Runs the downloader as a subprocess inside the pipeline's working
//! directory and asks it to print the final file path once post-processing
//! is done. Any youtube-dl compatible binary that understands
//! `--print after_move:filepath` works.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::config::FetcherConfig;
use crate::core::PipelineError;
use crate::domain::{Item, MediaFile};

use super::Fetcher;

/// Fetcher backed by a yt-dlp style CLI
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    /// Path to the downloader binary (default: "yt-dlp")
    binary_path: String,
    /// Kill the download after this long
    timeout: Option<Duration>,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::with_binary_path("yt-dlp")
    }

    /// Create a fetcher with a custom binary path
    pub fn with_binary_path(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            binary_path: config.binary.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Arguments passed to the downloader
    fn command_args(item: &Item, work_dir: &Path) -> Vec<String> {
        let template = work_dir.join("%(id)s.%(ext)s");
        vec![
            "-f".to_string(),
            item.quality.format_selector(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            item.url.clone(),
        ]
    }

    /// Find the downloaded file when the path was not printed
    async fn scan_work_dir(item: &Item, work_dir: &Path) -> Result<PathBuf, PipelineError> {
        let mut entries = tokio::fs::read_dir(work_dir).await?;
        let mut candidates = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(item.id.as_str()) && !name.ends_with(".part") {
                candidates.push(entry.path());
            }
        }

        candidates.sort();
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::NotFound(item.id.to_string()))
    }
}

/// Last non-empty line of the downloader's stdout, if it names a file
fn printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(PathBuf::from)
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    #[instrument(skip(self, item, work_dir), fields(item = %item.id, quality = %item.quality))]
    async fn fetch(&self, item: &Item, work_dir: &Path) -> Result<MediaFile, PipelineError> {
        tokio::fs::create_dir_all(work_dir).await?;

        let child = Command::new(&self.binary_path)
            .args(Self::command_args(item, work_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| PipelineError::Fetch {
                    status: -1,
                    diagnostics: format!("timed out after {:?}", limit),
                })??,
            None => child.wait_with_output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Fetch {
                status: output.status.code().unwrap_or(-1),
                diagnostics: format!("{}\n{}", stdout.trim(), stderr.trim())
                    .trim()
                    .to_string(),
            });
        }

        let path = match printed_path(&stdout) {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
            printed => {
                if let Some(path) = printed {
                    warn!(path = %path.display(), "Printed path does not exist, scanning work dir");
                }
                Self::scan_work_dir(item, work_dir).await?
            }
        };

        let file = MediaFile::from_path(path).await?;
        debug!(path = %file.path.display(), size = file.size, "Fetched");
        Ok(file)
    }
}
