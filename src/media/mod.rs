//! MP4 container parsing and standalone part serialization.
//!
//! The segmenter needs two things from a container:
//!
//! 1. Parsing the `moov` atom (and any `moof` fragments) into per-track
//!    sample tables with absolute file offsets
//! 2. Writing a subset of those samples back out as a self-contained
//!    fragmented MP4 (`ftyp` + `moov`/`mvex` + `moof` + `mdat`)
//!
//! Sample payloads are copied byte for byte; nothing is re-encoded.

mod atoms;
mod reader;
mod sample_table;
mod writer;

pub use atoms::{Atom, AtomType, HandlerType, TrackInfo};
pub use reader::Mp4Reader;
pub use sample_table::{SampleEntry, SampleTable, SampleTableBuilder};
pub use writer::{PartTrack, PartWriter};

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

use thiserror::Error;

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, Mp4Error>;

/// Errors raised while reading or writing MP4 containers.
#[derive(Debug, Error)]
pub enum Mp4Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 file structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required atom in MP4 file.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),
}

impl Mp4Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }
}

/// Parsed MP4 file with extracted sample tables.
#[derive(Debug, Clone)]
pub struct Mp4File {
    /// Duration in movie timescale units (may be 0 for fragmented files).
    pub duration: u64,
    /// Movie timescale (time units per second).
    pub timescale: u32,
    /// Every track that carries a sample description, in file order.
    pub tracks: Vec<TrackInfo>,
    /// Whether samples were found in `moof` fragments.
    pub is_fragmented: bool,
}

impl Mp4File {
    /// Parse an MP4 file from the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::parse(&mut reader)
    }

    /// Parse an MP4 file from a reader.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let mut mp4_reader = Mp4Reader::new(reader)?;
        mp4_reader.parse()
    }

    /// Total duration in seconds.
    ///
    /// Falls back to the longest track when the movie header carries no
    /// duration, as fragmented files usually do.
    pub fn duration_secs(&self) -> f64 {
        let header = if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        };

        if header > 0.0 {
            header
        } else {
            self.tracks
                .iter()
                .map(TrackInfo::duration_secs)
                .fold(0.0, f64::max)
        }
    }

    /// First video track, if any.
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.handler_type.is_video())
    }

    /// First audio track, if any.
    pub fn audio_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.handler_type.is_audio())
    }

    /// Track used to decide split points: video when present, otherwise
    /// the first track holding samples.
    pub fn primary_track(&self) -> Option<&TrackInfo> {
        self.video_track()
            .filter(|t| !t.sample_table.is_empty())
            .or_else(|| self.tracks.iter().find(|t| !t.sample_table.is_empty()))
    }

    /// Total number of samples across all tracks.
    pub fn sample_count(&self) -> usize {
        self.tracks.iter().map(|t| t.sample_table.samples.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: u32, handler: HandlerType, samples: u32) -> TrackInfo {
        let mut builder = SampleTableBuilder::new();
        if samples > 0 {
            builder.set_stts(vec![(samples, 1000)]);
            builder.set_stsc(vec![(1, samples, 1)]);
            builder.set_stsz(10, samples, vec![]);
            builder.set_chunk_offsets(vec![0]);
        }
        let mut info = TrackInfo::new(id);
        info.handler_type = handler;
        info.timescale = 1000;
        info.sample_table = builder.build();
        info
    }

    #[test]
    fn test_duration_from_header() {
        let mp4 = Mp4File {
            duration: 120_000,
            timescale: 1000,
            tracks: vec![],
            is_fragmented: false,
        };
        assert!((mp4.duration_secs() - 120.0).abs() < 0.001);
    }

    #[test]
    fn test_duration_falls_back_to_tracks() {
        let mp4 = Mp4File {
            duration: 0,
            timescale: 1000,
            tracks: vec![track(1, HandlerType::Audio, 3), track(2, HandlerType::Video, 5)],
            is_fragmented: true,
        };
        assert!((mp4.duration_secs() - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_primary_track_prefers_video() {
        let mp4 = Mp4File {
            duration: 0,
            timescale: 1000,
            tracks: vec![track(1, HandlerType::Audio, 3), track(2, HandlerType::Video, 5)],
            is_fragmented: false,
        };
        assert_eq!(mp4.primary_track().map(|t| t.track_id), Some(2));
        assert_eq!(mp4.sample_count(), 8);
    }

    #[test]
    fn test_primary_track_skips_empty_video() {
        let mp4 = Mp4File {
            duration: 0,
            timescale: 1000,
            tracks: vec![track(1, HandlerType::Video, 0), track(2, HandlerType::Audio, 4)],
            is_fragmented: false,
        };
        assert_eq!(mp4.primary_track().map(|t| t.track_id), Some(2));
    }
}
