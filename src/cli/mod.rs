//! Command-line interface for ytrelay.
//!
//! Provides commands for the polling service, a single poll cycle, manual
//! delivery of one video, local splitting, and config inspection.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::app::AppContext;
use crate::config::Config;
use crate::core::Segmenter;
use crate::domain::{Item, MediaFile, Quality};

/// Announcement used for manually requested deliveries
const MANUAL_ANNOUNCEMENT: &str = "Downloading...";

/// ytrelay - Relay new subscription uploads to a Telegram chat
#[derive(Parser, Debug)]
#[command(name = "ytrelay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: search for .ytrelay/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll subscriptions forever
    Run,

    /// Run a single poll cycle and exit
    Poll,

    /// Download one video and deliver it to the chat
    Send {
        /// Video URL
        url: String,

        /// Maximum vertical resolution (default from config)
        #[arg(short, long)]
        quality: Option<u32>,

        /// Shorthand for --quality 720
        #[arg(long, conflicts_with = "quality")]
        hd: bool,
    },

    /// Split a local file the way the pipeline would and print the parts
    Split {
        /// Media file to split (deleted if it gets split)
        file: PathBuf,
    },

    /// Show resolved configuration (secrets redacted)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match self.command {
            Commands::Run => run_service(config).await,
            Commands::Poll => poll_once(config).await,
            Commands::Send { url, quality, hd } => {
                let quality = if hd {
                    Quality::HD
                } else {
                    quality.map(Quality).unwrap_or(config.fetcher.default_quality)
                };
                send_video(config, &url, quality).await
            }
            Commands::Split { file } => split_file(config, file).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Supervised poll loop until Ctrl-C or a fatal error
async fn run_service(config: Config) -> Result<()> {
    let context = AppContext::new(config)?;
    let supervisor = context.supervisor()?;

    info!(
        interval_secs = context.config.poller.interval_secs,
        downloads = %context.config.downloads_dir.display(),
        "Starting poller"
    );

    tokio::select! {
        result = supervisor.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}

async fn poll_once(config: Config) -> Result<()> {
    let context = AppContext::new(config)?;
    let report = context
        .orchestrator()?
        .run_cycle()
        .await
        .context("Poll cycle failed")?;

    println!("Discovered: {}", report.discovered);
    println!("New: {}", report.started.len());
    for run in &report.completed {
        println!("  {}: {}", run.item_id, run.state.label());
    }

    Ok(())
}

async fn send_video(config: Config, url: &str, quality: Quality) -> Result<()> {
    let context = AppContext::new(config)?;
    let item = Item::from_url(url, quality);
    if item.id.as_str().is_empty() {
        anyhow::bail!("Could not extract a video id from {}", url);
    }

    let run = match context
        .pipeline()
        .run(item, Some(MANUAL_ANNOUNCEMENT.to_string()))
        .await
    {
        Ok(run) => run,
        Err(e) => {
            let err = anyhow::Error::new(e).context(format!("Failed to deliver {}", url));
            if context.config.telegram.report_errors {
                if let Err(report_err) = context.telegram.report("while sending", &err).await {
                    warn!(error = %format!("{:#}", report_err), "Failed to report error to chat");
                }
            }
            return Err(err);
        }
    };

    eprintln!("[{} delivered, run {}]", run.item_id, run.id);
    Ok(())
}

async fn split_file(config: Config, file: PathBuf) -> Result<()> {
    let media = MediaFile::from_path(&file)
        .await
        .with_context(|| format!("Failed to stat {}", file.display()))?;

    let parts = Segmenter::new(config.split)
        .segment(media)
        .await
        .with_context(|| format!("Failed to split {}", file.display()))?;

    for part in &parts {
        println!("{}", part.path.display());
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let shown = serde_yaml::to_string(&config.redacted()).context("Failed to render config")?;
    println!("{}", shown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_send_flags() {
        let cli = Cli::parse_from(["ytrelay", "send", "https://youtu.be/abc", "--hd"]);
        match cli.command {
            Commands::Send { url, quality, hd } => {
                assert_eq!(url, "https://youtu.be/abc");
                assert_eq!(quality, None);
                assert!(hd);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["ytrelay", "send", "u", "--hd", "--quality", "360"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["ytrelay", "poll", "--config", "/etc/ytrelay.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ytrelay.yaml")));
        assert!(matches!(cli.command, Commands::Poll));
    }
}
