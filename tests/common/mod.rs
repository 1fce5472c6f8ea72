//! Shared fixtures for integration tests.
//!
//! `progressive_mp4` writes a small non-fragmented MP4 with one video and
//! one audio track, each stored as a single chunk. Payload bytes encode the
//! sample index so copied data can be traced back to its source.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ytrelay::adapters::{Channel, Discovery, Fetcher, MessageId};
use ytrelay::core::PipelineError;
use ytrelay::domain::{Item, ItemId, MediaFile, Quality};

pub const VIDEO_SAMPLES: u32 = 40;
pub const VIDEO_TIMESCALE: u32 = 1000;
pub const VIDEO_DELTA: u32 = 1000;
pub const VIDEO_SAMPLE_SIZE: u32 = 100;
/// Every other video sample is a keyframe
pub const KEYFRAME_EVERY: u32 = 2;

pub const AUDIO_SAMPLES: u32 = 80;
pub const AUDIO_TIMESCALE: u32 = 48_000;
pub const AUDIO_DELTA: u32 = 24_000;
pub const AUDIO_SAMPLE_SIZE: u32 = 20;

pub const MOVIE_TIMESCALE: u32 = 1000;
pub const MOVIE_SECS: u32 = 40;

fn boxed(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn full_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(payload);
    boxed(kind, &body)
}

fn u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn mvhd() -> Vec<u8> {
    let mut body = vec![0u8; 96];
    body[8..12].copy_from_slice(&MOVIE_TIMESCALE.to_be_bytes());
    body[12..16].copy_from_slice(&(MOVIE_SECS * MOVIE_TIMESCALE).to_be_bytes());
    full_box(b"mvhd", &body)
}

fn tkhd(track_id: u32, width: u32, height: u32) -> Vec<u8> {
    let mut body = vec![0u8; 80];
    body[8..12].copy_from_slice(&track_id.to_be_bytes());
    body[72..76].copy_from_slice(&(width << 16).to_be_bytes());
    body[76..80].copy_from_slice(&(height << 16).to_be_bytes());
    full_box(b"tkhd", &body)
}

fn mdhd(timescale: u32, duration: u32) -> Vec<u8> {
    let mut body = u32s(&[0, 0, timescale, duration]);
    // "und"
    body.extend_from_slice(&0x55c4u16.to_be_bytes());
    body.extend_from_slice(&[0, 0]);
    full_box(b"mdhd", &body)
}

fn hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(handler);
    body.extend_from_slice(&[0u8; 12]);
    body.push(0);
    full_box(b"hdlr", &body)
}

struct TrackLayout {
    id: u32,
    handler: &'static [u8; 4],
    timescale: u32,
    samples: u32,
    delta: u32,
    sample_size: u32,
    keyframe_every: Option<u32>,
}

impl TrackLayout {
    fn data_len(&self) -> u32 {
        self.samples * self.sample_size
    }

    fn trak(&self, chunk_offset: u32) -> Vec<u8> {
        let mut stbl = full_box(b"stsd", &u32s(&[0]));
        stbl.extend(full_box(b"stts", &u32s(&[1, self.samples, self.delta])));
        if let Some(every) = self.keyframe_every {
            let sync: Vec<u32> = (0..self.samples).step_by(every as usize).map(|i| i + 1).collect();
            let mut body = u32s(&[sync.len() as u32]);
            body.extend(u32s(&sync));
            stbl.extend(full_box(b"stss", &body));
        }
        stbl.extend(full_box(b"stsc", &u32s(&[1, 1, self.samples, 1])));
        stbl.extend(full_box(b"stsz", &u32s(&[self.sample_size, self.samples])));
        stbl.extend(full_box(b"stco", &u32s(&[1, chunk_offset])));

        let minf = boxed(b"minf", &boxed(b"stbl", &stbl));
        let mut mdia = mdhd(self.timescale, self.samples * self.delta);
        mdia.extend(hdlr(self.handler));
        mdia.extend(minf);

        let (width, height) = if self.handler == b"vide" { (640, 360) } else { (0, 0) };
        let mut trak = tkhd(self.id, width, height);
        trak.extend(boxed(b"mdia", &mdia));
        boxed(b"trak", &trak)
    }

    fn payload(&self) -> Vec<u8> {
        (0..self.samples)
            .flat_map(|i| std::iter::repeat((i % 251) as u8).take(self.sample_size as usize))
            .collect()
    }
}

fn layouts() -> [TrackLayout; 2] {
    [
        TrackLayout {
            id: 1,
            handler: b"vide",
            timescale: VIDEO_TIMESCALE,
            samples: VIDEO_SAMPLES,
            delta: VIDEO_DELTA,
            sample_size: VIDEO_SAMPLE_SIZE,
            keyframe_every: Some(KEYFRAME_EVERY),
        },
        TrackLayout {
            id: 2,
            handler: b"soun",
            timescale: AUDIO_TIMESCALE,
            samples: AUDIO_SAMPLES,
            delta: AUDIO_DELTA,
            sample_size: AUDIO_SAMPLE_SIZE,
            keyframe_every: None,
        },
    ]
}

fn moov(tracks: &[TrackLayout], first_offset: u32) -> Vec<u8> {
    let mut body = mvhd();
    let mut offset = first_offset;
    for track in tracks {
        body.extend(track.trak(offset));
        offset += track.data_len();
    }
    boxed(b"moov", &body)
}

/// Bytes of a 40 second progressive MP4 (video + audio)
pub fn progressive_mp4() -> Vec<u8> {
    let tracks = layouts();

    let mut ftyp = b"isom".to_vec();
    ftyp.extend(u32s(&[0x200]));
    ftyp.extend_from_slice(b"isommp41");
    let ftyp = boxed(b"ftyp", &ftyp);

    // Offsets are fixed width, so the first pass only measures moov
    let moov_len = moov(&tracks, 0).len() as u32;
    let mdat_data_start = ftyp.len() as u32 + moov_len + 8;

    let mut data = Vec::new();
    for track in &tracks {
        data.extend(track.payload());
    }

    let mut out = ftyp;
    out.extend(moov(&tracks, mdat_data_start));
    out.extend(boxed(b"mdat", &data));
    out
}

/// Write the fixture to `path`
pub fn write_mp4(path: &Path) -> MediaFile {
    let bytes = progressive_mp4();
    std::fs::write(path, &bytes).unwrap();
    MediaFile::new(path, bytes.len() as u64)
}

pub fn item(id: &str) -> Item {
    Item::from_id(ItemId::new(id), Quality::STANDARD)
}

/// Discovery returning a fixed list
pub struct StaticDiscovery {
    pub items: Vec<Item>,
}

impl StaticDiscovery {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            items: ids.iter().map(|id| item(id)).collect(),
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover(&self) -> Result<Vec<Item>, PipelineError> {
        Ok(self.items.clone())
    }
}

/// Fetcher that writes a fixed payload into the work dir
pub struct FixtureFetcher {
    pub payload: Vec<u8>,
    pub fail_for: Option<String>,
    pub fetched: Mutex<Vec<ItemId>>,
}

impl FixtureFetcher {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            fail_for: None,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, id: &str) -> Self {
        self.fail_for = Some(id.to_string());
        self
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn fetch(&self, item: &Item, work_dir: &Path) -> Result<MediaFile, PipelineError> {
        self.fetched.lock().unwrap().push(item.id.clone());
        if self.fail_for.as_deref() == Some(item.id.as_str()) {
            return Err(PipelineError::Fetch {
                status: 1,
                diagnostics: "ERROR: Video unavailable".to_string(),
            });
        }

        tokio::fs::create_dir_all(work_dir).await?;
        let path = work_dir.join(format!("{}.mp4", item.id));
        tokio::fs::write(&path, &self.payload).await?;
        Ok(MediaFile::new(path, self.payload.len() as u64))
    }
}

/// What a channel was asked to send
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Document {
        file_name: String,
        reply_to: Option<MessageId>,
    },
}

/// Channel that records every message
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document { file_name, .. } => Some(file_name),
                Sent::Text(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn send_text(&self, text: &str) -> Result<MessageId, PipelineError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent::Text(text.to_string()));
        Ok(sent.len() as MessageId)
    }

    async fn send_document(
        &self,
        path: &Path,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::Delivery(format!("{} is gone", path.display())));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent::Document {
            file_name: file_name(path),
            reply_to,
        });
        Ok(sent.len() as MessageId)
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn part_paths(original: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| ytrelay::domain::SegmentPart::part_path(original, i))
        .collect()
}
