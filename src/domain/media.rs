//! Media files moving through a pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A downloaded media file owned by exactly one pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Location on local storage
    pub path: PathBuf,

    /// Size in bytes at the time it was handed over
    pub size: u64,
}

impl MediaFile {
    /// Create a media file record
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Stat a file on disk and record its size
    pub async fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }
}

/// One deliverable, independently playable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPart {
    /// Position in delivery order (0-based)
    pub index: usize,

    /// Location on local storage
    pub path: PathBuf,

    /// File stem of the media file this part came from
    pub parent_stem: String,
}

impl SegmentPart {
    /// A part that is the untouched original file
    pub fn whole(file: &MediaFile) -> Self {
        Self {
            index: 0,
            path: file.path.clone(),
            parent_stem: file_stem(&file.path),
        }
    }

    /// Derive the path of part `index` of `original`: `<stem>_part<index><ext>`
    pub fn part_path(original: &Path, index: usize) -> PathBuf {
        let stem = file_stem(original);
        let name = match original.extension() {
            Some(ext) => format!("{}_part{}.{}", stem, index, ext.to_string_lossy()),
            None => format!("{}_part{}", stem, index),
        };
        original.with_file_name(name)
    }

    /// File name used when uploading
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}
