//! Media segmentation.
//!
//! Files under the size threshold pass through untouched. Larger files are
//! cut into fragments of roughly `part_units` each (by duration, scaled from
//! the file's average bitrate) and every fragment is written out as its own
//! playable fMP4 next to the source. The source is deleted once all parts
//! exist.

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::{MediaFile, SegmentPart};
use crate::media::{Mp4Error, Mp4File, PartTrack, PartWriter, TrackInfo};

use super::error::PipelineError;

/// Size thresholds for splitting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitPolicy {
    /// Bytes per size unit (1_000_000 = decimal megabytes)
    pub unit_bytes: u64,

    /// Files of at least this many units are split
    pub threshold_units: f64,

    /// Target size of each part, in units
    pub part_units: f64,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            unit_bytes: 1_000_000,
            threshold_units: 50.0,
            part_units: 30.0,
        }
    }
}

impl SplitPolicy {
    /// Whether a file of `size` bytes has to be split
    pub fn needs_split(&self, size: u64) -> bool {
        self.size_units(size) >= self.threshold_units
    }

    pub fn size_units(&self, size: u64) -> f64 {
        size as f64 / self.unit_bytes.max(1) as f64
    }

    /// Fragment duration in seconds for a file of the given size and length
    pub fn fragment_secs(&self, total_secs: f64, size: u64) -> f64 {
        self.part_units * (total_secs / self.size_units(size))
    }

    /// Number of fragments: `ceil(total / fragment)`
    pub fn fragment_count(&self, total_secs: f64, size: u64) -> usize {
        let target = self.fragment_secs(total_secs, size);
        if target.is_nan() || target <= 0.0 || !total_secs.is_finite() {
            return 1;
        }
        // Absorb float noise so 600 / 150 stays 4
        ((total_secs / target) - 1e-9).ceil().max(1.0) as usize
    }
}

/// One track's samples within a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackSpan {
    track: usize,
    samples: Range<usize>,
    base_decode_time: u64,
}

/// Planned split: time span plus per-track sample ranges
#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    start_secs: f64,
    end_secs: f64,
    spans: Vec<TrackSpan>,
}

impl Fragment {
    fn is_empty(&self) -> bool {
        self.spans.iter().all(|s| s.samples.is_empty())
    }

    fn writer<'a>(&self, mp4: &'a Mp4File) -> PartWriter<'a> {
        self.spans
            .iter()
            .filter(|span| !span.samples.is_empty())
            .fold(PartWriter::new(mp4.timescale), |writer, span| {
                let track = &mp4.tracks[span.track];
                let samples = &track.sample_table.samples[span.samples.clone()];
                writer.track(PartTrack::new(track, samples).base_decode_time(span.base_decode_time))
            })
    }
}

/// Splits oversized media files into independently playable parts
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    policy: SplitPolicy,
}

impl Segmenter {
    pub fn new(policy: SplitPolicy) -> Self {
        Self { policy }
    }

    /// Pass `file` through or split it.
    ///
    /// On success the returned parts are in playback order and, if a split
    /// happened, the source file is gone. On failure the source is left in
    /// place and no parts remain on disk.
    #[instrument(skip(self, file), fields(path = %file.path.display(), size = file.size))]
    pub async fn segment(&self, file: MediaFile) -> Result<Vec<SegmentPart>, PipelineError> {
        if !self.policy.needs_split(file.size) {
            debug!("Below split threshold, passing through");
            return Ok(vec![SegmentPart::whole(&file)]);
        }

        let policy = self.policy;
        tokio::task::spawn_blocking(move || split_file(&file, &policy))
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

fn split_file(file: &MediaFile, policy: &SplitPolicy) -> Result<Vec<SegmentPart>, PipelineError> {
    let mp4 = Mp4File::open(&file.path).map_err(|e| PipelineError::media(&file.path, e))?;

    let total_secs = mp4.duration_secs();
    if total_secs.is_nan() || total_secs <= 0.0 {
        return Err(PipelineError::media(
            &file.path,
            Mp4Error::invalid_mp4("media has no duration"),
        ));
    }

    let target_secs = policy.fragment_secs(total_secs, file.size);
    let count = policy.fragment_count(total_secs, file.size);
    let plan = plan_fragments(&mp4, target_secs, count)
        .map_err(|e| PipelineError::media(&file.path, e))?;

    info!(
        total_secs,
        target_secs,
        planned = count,
        parts = plan.len(),
        "Splitting media"
    );

    if plan.len() < 2 {
        warn!("Split plan has fewer than two parts, passing through");
        return Ok(vec![SegmentPart::whole(file)]);
    }

    let parent_stem = SegmentPart::whole(file).parent_stem;
    let mut parts: Vec<SegmentPart> = Vec::with_capacity(plan.len());

    for (index, fragment) in plan.iter().enumerate() {
        let path = SegmentPart::part_path(&file.path, index);
        let written = fragment
            .writer(&mp4)
            .sequence_number(index as u32 + 1)
            .write_file(&file.path, &path);

        match written {
            Ok(bytes) => {
                debug!(
                    index,
                    bytes,
                    start = fragment.start_secs,
                    end = fragment.end_secs,
                    "Part written"
                );
                parts.push(SegmentPart {
                    index,
                    path,
                    parent_stem: parent_stem.clone(),
                });
            }
            Err(e) => {
                remove_parts(&parts);
                return Err(PipelineError::media(&file.path, e));
            }
        }
    }

    if let Err(e) = std::fs::remove_file(&file.path) {
        remove_parts(&parts);
        return Err(e.into());
    }

    Ok(parts)
}

fn remove_parts(parts: &[SegmentPart]) {
    for part in parts {
        if let Err(e) = std::fs::remove_file(&part.path) {
            warn!(path = %part.path.display(), error = %e, "Failed to remove partial output");
        }
    }
}

/// Compute fragment boundaries.
///
/// Cuts on the primary track land on the first keyframe at or after each
/// boundary, so every part opens on a sync sample. Boundaries that snap to
/// an earlier cut, or lie past the last keyframe, are merged into the
/// previous fragment. Every other track is cut at the primary track's cut
/// time. Fragments with no samples are dropped.
fn plan_fragments(mp4: &Mp4File, target_secs: f64, count: usize) -> Result<Vec<Fragment>, Mp4Error> {
    let primary = mp4
        .primary_track()
        .ok_or_else(|| Mp4Error::invalid_mp4("no track holds samples"))?;
    let primary_idx = mp4
        .tracks
        .iter()
        .position(|t| std::ptr::eq(t, primary))
        .unwrap_or(0);

    let table = &primary.sample_table;
    let sample_count = table.samples.len();

    // Primary-track sample index at each fragment start, plus the end.
    // Boundaries past the last keyframe add no cut.
    let mut cut_indices = vec![0usize];
    for i in 1..count {
        let boundary = primary.secs_to_ticks(i as f64 * target_secs);
        let Some(cut) = table.first_keyframe_at_or_after(boundary) else {
            break;
        };
        let cut = cut as usize;
        if cut > cut_indices.last().copied().unwrap_or(0) {
            cut_indices.push(cut);
        }
    }
    cut_indices.push(sample_count);
    let count = cut_indices.len() - 1;

    let cut_secs: Vec<f64> = cut_indices
        .iter()
        .enumerate()
        .map(|(i, &idx)| {
            if i == 0 {
                0.0
            } else {
                primary.ticks_to_secs(cut_ticks(primary, idx))
            }
        })
        .collect();

    let mut fragments = Vec::with_capacity(count);
    for i in 0..count {
        let spans = mp4
            .tracks
            .iter()
            .enumerate()
            .map(|(track_idx, track)| {
                let samples = if track_idx == primary_idx {
                    cut_indices[i]..cut_indices[i + 1]
                } else {
                    track_range(track, cut_secs[i], cut_secs[i + 1], i == 0, i + 1 == count)
                };
                let start_ticks = if i == 0 {
                    0
                } else {
                    track.secs_to_ticks(cut_secs[i])
                };
                let base_decode_time = track
                    .sample_table
                    .samples
                    .get(samples.start)
                    .filter(|_| !samples.is_empty())
                    .map(|s| {
                        if track_idx == primary_idx {
                            0
                        } else {
                            s.dts.saturating_sub(start_ticks)
                        }
                    })
                    .unwrap_or(0);
                TrackSpan {
                    track: track_idx,
                    samples,
                    base_decode_time,
                }
            })
            .collect();

        let fragment = Fragment {
            start_secs: cut_secs[i],
            end_secs: cut_secs[i + 1],
            spans,
        };
        if !fragment.is_empty() {
            fragments.push(fragment);
        }
    }

    Ok(fragments)
}

/// Decode time of sample `idx`, or the end of the track when past the last sample
fn cut_ticks(track: &TrackInfo, idx: usize) -> u64 {
    track
        .sample_table
        .samples
        .get(idx)
        .map(|s| s.dts)
        .unwrap_or_else(|| track.sample_table.end_dts())
}

fn track_range(track: &TrackInfo, start_secs: f64, end_secs: f64, first: bool, last: bool) -> Range<usize> {
    let table = &track.sample_table;
    let start = if first {
        0
    } else {
        table.first_at_or_after(track.secs_to_ticks(start_secs)) as usize
    };
    let end = if last {
        table.samples.len()
    } else {
        table.first_at_or_after(track.secs_to_ticks(end_secs)) as usize
    };
    start..end.max(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{HandlerType, SampleTableBuilder};

    fn track(id: u32, handler: HandlerType, timescale: u32, samples: u32, delta: u32, sync: Vec<u32>) -> TrackInfo {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(samples, delta)]);
        builder.set_sync_samples(sync);
        builder.set_stsc(vec![(1, samples, 1)]);
        builder.set_stsz(10, samples, vec![]);
        builder.set_chunk_offsets(vec![0]);

        let mut info = TrackInfo::new(id);
        info.handler_type = handler;
        info.timescale = timescale;
        info.sample_table = builder.build();
        info.sample_description = Some(Vec::new());
        info
    }

    fn movie(tracks: Vec<TrackInfo>) -> Mp4File {
        Mp4File {
            duration: 0,
            timescale: 1000,
            tracks,
            is_fragmented: false,
        }
    }

    #[test]
    fn test_policy_defaults() {
        let policy = SplitPolicy::default();
        assert!(!policy.needs_split(49_999_999));
        assert!(policy.needs_split(50_000_000));
    }

    #[test]
    fn test_fragment_count_for_worked_example() {
        // 120 MB, 600 s => 150 s fragments, 4 parts
        let policy = SplitPolicy::default();
        assert!((policy.fragment_secs(600.0, 120_000_000) - 150.0).abs() < 1e-9);
        assert_eq!(policy.fragment_count(600.0, 120_000_000), 4);
    }

    #[test]
    fn test_fragment_count_rounds_up() {
        // 100 MB, 100 s => 30 s fragments => 4 parts (last one 10 s)
        let policy = SplitPolicy::default();
        assert_eq!(policy.fragment_count(100.0, 100_000_000), 4);
    }

    #[test]
    fn test_plan_on_all_keyframes_is_even() {
        // 40 one-second samples, all sync
        let mp4 = movie(vec![track(1, HandlerType::Video, 1000, 40, 1000, vec![])]);
        let plan = plan_fragments(&mp4, 10.0, 4).unwrap();

        assert_eq!(plan.len(), 4);
        let ranges: Vec<_> = plan.iter().map(|f| f.spans[0].samples.clone()).collect();
        assert_eq!(ranges, vec![0..10, 10..20, 20..30, 30..40]);
        assert!((plan[3].end_secs - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_snaps_to_next_keyframe() {
        // Keyframes every 4 samples (0, 4, 8, ...)
        let sync = (0..10).map(|k| k * 4 + 1).collect();
        let mp4 = movie(vec![track(1, HandlerType::Video, 1000, 40, 1000, sync)]);
        let plan = plan_fragments(&mp4, 10.0, 4).unwrap();

        let starts: Vec<_> = plan.iter().map(|f| f.spans[0].samples.start).collect();
        assert_eq!(starts, vec![0, 12, 20, 32]);
        for fragment in &plan {
            let first = fragment.spans[0].samples.start;
            assert!(mp4.tracks[0].sample_table.samples[first].is_keyframe);
        }
    }

    #[test]
    fn test_audio_follows_video_cut_time() {
        let sync = (0..10).map(|k| k * 4 + 1).collect();
        let video = track(1, HandlerType::Video, 1000, 40, 1000, sync);
        // 0.5 s audio samples at 48 kHz
        let audio = track(2, HandlerType::Audio, 48_000, 80, 24_000, vec![]);
        let mp4 = movie(vec![video, audio]);

        let plan = plan_fragments(&mp4, 10.0, 4).unwrap();

        // Video cut at 12 s => audio cut at sample 24
        assert_eq!(plan[0].spans[1].samples, 0..24);
        assert_eq!(plan[1].spans[1].samples.start, 24);
        assert_eq!(plan[3].spans[1].samples.end, 80);

        let audio_total: usize = plan.iter().map(|f| f.spans[1].samples.len()).sum();
        assert_eq!(audio_total, 80);
    }

    #[test]
    fn test_lone_keyframe_means_no_cut() {
        let mp4 = movie(vec![track(1, HandlerType::Video, 1000, 40, 1000, vec![1])]);
        let plan = plan_fragments(&mp4, 10.0, 4).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].spans[0].samples, 0..40);
    }

    #[test]
    fn test_sparse_keyframes_merge_fragments() {
        // Keyframes at samples 0 and 25 only
        let mp4 = movie(vec![track(1, HandlerType::Video, 1000, 40, 1000, vec![1, 26])]);
        let plan = plan_fragments(&mp4, 10.0, 4).unwrap();

        let ranges: Vec<_> = plan.iter().map(|f| f.spans[0].samples.clone()).collect();
        assert_eq!(ranges, vec![0..25, 25..40]);
        for fragment in &plan {
            let first = fragment.spans[0].samples.start;
            assert!(mp4.tracks[0].sample_table.samples[first].is_keyframe);
        }
        assert!((plan[1].start_secs - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_small_file_passes_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("small.mp4");
        std::fs::write(&path, b"not even parsed").unwrap();

        let segmenter = Segmenter::default();
        let parts = segmenter
            .segment(MediaFile::new(&path, 15))
            .await
            .unwrap();

        assert_eq!(parts, vec![SegmentPart::whole(&MediaFile::new(&path, 15))]);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unparseable_large_file_is_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.mp4");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let segmenter = Segmenter::new(SplitPolicy {
            unit_bytes: 1,
            threshold_units: 1000.0,
            part_units: 600.0,
        });
        let err = segmenter
            .segment(MediaFile::new(&path, 2048))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Parse { .. }));
        assert!(path.exists());
        assert!(!SegmentPart::part_path(&path, 0).exists());
    }
}
