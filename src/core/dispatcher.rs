//! Delivery of segment parts.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, instrument};

use crate::adapters::{Channel, MessageId};
use crate::domain::SegmentPart;

use super::error::PipelineError;

/// Sends a batch of parts as replies to an announcement.
///
/// All uploads are issued together. Local files are removed only once every
/// upload is confirmed; a single failure fails the batch and leaves all
/// parts on disk.
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Deliver `parts` in reply to `announcement`, returning the sent message ids
    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    pub async fn deliver(
        &self,
        announcement: MessageId,
        parts: &[SegmentPart],
    ) -> Result<Vec<MessageId>, PipelineError> {
        let sends = parts.iter().map(|part| {
            debug!(part = part.index, file = %part.file_name(), "Sending part");
            self.channel.send_document(&part.path, Some(announcement))
        });
        let sent = try_join_all(sends).await?;

        for part in parts {
            tokio::fs::remove_file(&part.path).await?;
        }

        info!(announcement, "All parts delivered");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records uploads; fails for files whose name contains `fail_on`
    struct RecordingChannel {
        sent: Mutex<Vec<(PathBuf, Option<MessageId>)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        async fn send_text(&self, _text: &str) -> Result<MessageId, PipelineError> {
            Ok(1)
        }

        async fn send_document(
            &self,
            path: &Path,
            reply_to: Option<MessageId>,
        ) -> Result<MessageId, PipelineError> {
            let name = path.to_string_lossy().to_string();
            if let Some(ref needle) = self.fail_on {
                if name.contains(needle.as_str()) {
                    return Err(PipelineError::Delivery("Request Entity Too Large".to_string()));
                }
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((path.to_path_buf(), reply_to));
            Ok(100 + sent.len() as MessageId)
        }
    }

    fn parts(dir: &Path, count: usize) -> Vec<SegmentPart> {
        (0..count)
            .map(|index| {
                let path = dir.join(format!("v_part{}.mp4", index));
                std::fs::write(&path, b"data").unwrap();
                SegmentPart {
                    index,
                    path,
                    parent_stem: "v".to_string(),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_delivers_all_then_deletes() {
        let dir = TempDir::new().unwrap();
        let parts = parts(dir.path(), 3);
        let channel = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
            fail_on: None,
        });

        let ids = Dispatcher::new(channel.clone())
            .deliver(7, &parts)
            .await
            .unwrap();

        assert_eq!(ids.len(), 3);
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(_, reply)| *reply == Some(7)));
        assert!(parts.iter().all(|p| !p.path.exists()));
    }

    #[tokio::test]
    async fn test_failed_send_keeps_every_part() {
        let dir = TempDir::new().unwrap();
        let parts = parts(dir.path(), 3);
        let channel = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
            fail_on: Some("_part1".to_string()),
        });

        let err = Dispatcher::new(channel)
            .deliver(7, &parts)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Delivery(_)));
        assert!(parts.iter().all(|p| p.path.exists()));
    }
}
