//! Standalone part serialization.
//!
//! A part is a complete fragmented MP4: `ftyp`, a `moov` carrying each
//! track's original sample description plus `mvex`, then a single `moof`
//! and the `mdat` holding the selected samples. Any player that handles
//! fMP4 can open it without the rest of the source file.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

use bytes::{BufMut, BytesMut};

use super::{HandlerType, Mp4Error, Result, SampleEntry, TrackInfo};

/// trun flags: data-offset, duration, size, flags, composition offset
const TRUN_FLAGS: u32 = 0x000001 | 0x000100 | 0x000200 | 0x000400 | 0x000800;

const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

/// One track's contribution to a part.
#[derive(Debug, Clone, Copy)]
pub struct PartTrack<'a> {
    /// Source track (sample description, timescale, dimensions).
    pub track: &'a TrackInfo,
    /// Contiguous run of samples from the source track.
    pub samples: &'a [SampleEntry],
    /// Decode time of the first sample inside the part.
    pub base_decode_time: u64,
}

impl<'a> PartTrack<'a> {
    pub fn new(track: &'a TrackInfo, samples: &'a [SampleEntry]) -> Self {
        Self {
            track,
            samples,
            base_decode_time: 0,
        }
    }

    pub fn base_decode_time(mut self, time: u64) -> Self {
        self.base_decode_time = time;
        self
    }

    /// Sum of sample durations in the track timescale.
    pub fn duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }

    /// Bytes of sample payload.
    pub fn data_size(&self) -> u64 {
        self.samples.iter().map(|s| s.size as u64).sum()
    }
}

/// Writes a set of track runs as one self-contained fMP4 file.
pub struct PartWriter<'a> {
    movie_timescale: u32,
    sequence_number: u32,
    tracks: Vec<PartTrack<'a>>,
}

impl<'a> PartWriter<'a> {
    /// Create a writer using the given movie timescale.
    pub fn new(movie_timescale: u32) -> Self {
        Self {
            movie_timescale: movie_timescale.max(1),
            sequence_number: 1,
            tracks: Vec::new(),
        }
    }

    /// Set the mfhd sequence number.
    pub fn sequence_number(mut self, number: u32) -> Self {
        self.sequence_number = number;
        self
    }

    /// Add a track run.
    pub fn track(mut self, track: PartTrack<'a>) -> Self {
        self.tracks.push(track);
        self
    }

    /// Total bytes of sample payload across all tracks.
    pub fn data_size(&self) -> u64 {
        self.tracks.iter().map(PartTrack::data_size).sum()
    }

    /// Part duration in the movie timescale.
    pub fn duration(&self) -> u64 {
        self.tracks
            .iter()
            .map(|t| self.movie_ticks(t.duration(), t.track.timescale))
            .max()
            .unwrap_or(0)
    }

    /// Serialize everything up to (and including) the mdat header.
    pub fn header(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(4096);
        self.write_ftyp(&mut buf);
        self.write_moov(&mut buf)?;
        self.write_moof_and_mdat_header(&mut buf);
        Ok(buf.to_vec())
    }

    /// Write the part to `dest`, copying sample payloads from `source`.
    ///
    /// Returns the number of bytes written.
    pub fn write_to<R: Read + Seek, W: Write>(&self, source: &mut R, dest: &mut W) -> Result<u64> {
        let header = self.header()?;
        dest.write_all(&header)?;
        let mut written = header.len() as u64;

        for part in &self.tracks {
            for range in coalesce(part.samples) {
                let len = range.end - range.start;
                source.seek(SeekFrom::Start(range.start))?;
                let copied = io::copy(&mut source.by_ref().take(len), dest)?;
                if copied != len {
                    return Err(Mp4Error::invalid_mp4(format!(
                        "sample data at offset {} is truncated ({} of {} bytes)",
                        range.start, copied, len
                    )));
                }
                written += copied;
            }
        }

        Ok(written)
    }

    /// Write the part to a new file at `dest`, reading samples from `source`.
    ///
    /// A partially written file is removed on failure.
    pub fn write_file(&self, source: &Path, dest: &Path) -> Result<u64> {
        let result = (|| -> Result<u64> {
            let mut input = BufReader::new(File::open(source)?);
            let mut output = BufWriter::new(File::create(dest)?);
            let written = self.write_to(&mut input, &mut output)?;
            output.flush()?;
            Ok(written)
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(dest);
        }
        result
    }

    fn movie_ticks(&self, ticks: u64, timescale: u32) -> u64 {
        if timescale == 0 {
            return 0;
        }
        (ticks as u128 * self.movie_timescale as u128 / timescale as u128) as u64
    }

    fn write_ftyp(&self, buf: &mut BytesMut) {
        let brands = [b"isom", b"iso5", b"iso6", b"mp41"];
        buf.put_u32((16 + brands.len() * 4) as u32);
        buf.put_slice(b"ftyp");
        buf.put_slice(b"isom"); // major brand
        buf.put_u32(0x200); // minor version
        for brand in &brands {
            buf.put_slice(*brand);
        }
    }

    fn write_moov(&self, buf: &mut BytesMut) -> Result<()> {
        let moov = begin_box(buf, b"moov");
        let duration = self.duration();
        let next_track_id = self.tracks.iter().map(|t| t.track.track_id).max().unwrap_or(0) + 1;

        self.write_mvhd(buf, duration, next_track_id);
        for part in &self.tracks {
            self.write_trak(buf, part)?;
        }

        let mvex = begin_box(buf, b"mvex");
        buf.put_u32(20);
        buf.put_slice(b"mehd");
        buf.put_u32(0x0100_0000); // version 1
        buf.put_u64(duration);
        for part in &self.tracks {
            buf.put_u32(32);
            buf.put_slice(b"trex");
            buf.put_u32(0); // version/flags
            buf.put_u32(part.track.track_id);
            buf.put_u32(1); // default sample description index
            buf.put_u32(0); // default duration
            buf.put_u32(0); // default size
            buf.put_u32(0); // default flags
        }
        end_box(buf, mvex);

        end_box(buf, moov);
        Ok(())
    }

    fn write_mvhd(&self, buf: &mut BytesMut, duration: u64, next_track_id: u32) {
        buf.put_u32(120);
        buf.put_slice(b"mvhd");
        buf.put_u32(0x0100_0000); // version 1
        buf.put_u64(0); // creation time
        buf.put_u64(0); // modification time
        buf.put_u32(self.movie_timescale);
        buf.put_u64(duration);
        buf.put_u32(0x0001_0000); // rate = 1.0
        buf.put_u16(0x0100); // volume = 1.0
        buf.put_u16(0);
        buf.put_u64(0);
        put_matrix(buf);
        for _ in 0..6 {
            buf.put_u32(0); // pre_defined
        }
        buf.put_u32(next_track_id);
    }

    fn write_trak(&self, buf: &mut BytesMut, part: &PartTrack<'_>) -> Result<()> {
        let track = part.track;
        let stsd = track
            .sample_description
            .as_deref()
            .ok_or(Mp4Error::MissingAtom("stsd"))?;

        let trak = begin_box(buf, b"trak");

        // tkhd, version 1
        buf.put_u32(104);
        buf.put_slice(b"tkhd");
        buf.put_u32(0x0100_0007); // enabled, in movie, in preview
        buf.put_u64(0);
        buf.put_u64(0);
        buf.put_u32(track.track_id);
        buf.put_u32(0);
        buf.put_u64(self.movie_ticks(part.duration(), track.timescale));
        buf.put_u64(0);
        buf.put_u16(0); // layer
        buf.put_u16(0); // alternate group
        buf.put_u16(if track.handler_type.is_audio() { 0x0100 } else { 0 });
        buf.put_u16(0);
        put_matrix(buf);
        buf.put_u32(track.width.unwrap_or(0) << 16);
        buf.put_u32(track.height.unwrap_or(0) << 16);

        // Parts keep the source's presentation start so tracks stay in sync
        if track.edit_media_time > 0 {
            buf.put_u32(44);
            buf.put_slice(b"edts");
            buf.put_u32(36);
            buf.put_slice(b"elst");
            buf.put_u32(0x0100_0000); // version 1
            buf.put_u32(1);
            buf.put_u64(self.movie_ticks(part.duration(), track.timescale));
            buf.put_u64(track.edit_media_time);
            buf.put_u32(0x0001_0000); // rate = 1.0
        }

        let mdia = begin_box(buf, b"mdia");

        // mdhd, version 1
        buf.put_u32(44);
        buf.put_slice(b"mdhd");
        buf.put_u32(0x0100_0000);
        buf.put_u64(0);
        buf.put_u64(0);
        buf.put_u32(track.timescale);
        buf.put_u64(part.duration());
        buf.put_u16(track.language);
        buf.put_u16(0);

        let name: &[u8] = match track.handler_type {
            HandlerType::Video => b"VideoHandler",
            HandlerType::Audio => b"SoundHandler",
            _ => b"DataHandler",
        };
        buf.put_u32((33 + name.len()) as u32);
        buf.put_slice(b"hdlr");
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_slice(&track.handler_type.as_bytes());
        buf.put_slice(&[0; 12]);
        buf.put_slice(name);
        buf.put_u8(0);

        let minf = begin_box(buf, b"minf");
        match track.handler_type {
            HandlerType::Video => {
                buf.put_u32(20);
                buf.put_slice(b"vmhd");
                buf.put_u32(1);
                buf.put_slice(&[0; 8]);
            }
            HandlerType::Audio => {
                buf.put_u32(16);
                buf.put_slice(b"smhd");
                buf.put_u32(0);
                buf.put_u32(0);
            }
            _ => {
                buf.put_u32(12);
                buf.put_slice(b"nmhd");
                buf.put_u32(0);
            }
        }

        // dinf with a self-referencing url entry
        buf.put_u32(36);
        buf.put_slice(b"dinf");
        buf.put_u32(28);
        buf.put_slice(b"dref");
        buf.put_u32(0);
        buf.put_u32(1);
        buf.put_u32(12);
        buf.put_slice(b"url ");
        buf.put_u32(1);

        let stbl = begin_box(buf, b"stbl");
        buf.put_slice(stsd);
        for kind in [b"stts", b"stsc", b"stco"] {
            buf.put_u32(16);
            buf.put_slice(kind);
            buf.put_u32(0);
            buf.put_u32(0);
        }
        buf.put_u32(20);
        buf.put_slice(b"stsz");
        buf.put_u32(0);
        buf.put_u32(0); // sample size
        buf.put_u32(0); // sample count
        end_box(buf, stbl);

        end_box(buf, minf);
        end_box(buf, mdia);
        end_box(buf, trak);
        Ok(())
    }

    fn write_moof_and_mdat_header(&self, buf: &mut BytesMut) {
        let moof = begin_box(buf, b"moof");

        buf.put_u32(16);
        buf.put_slice(b"mfhd");
        buf.put_u32(0);
        buf.put_u32(self.sequence_number);

        // (position of the trun data_offset field, payload bytes before this run)
        let mut patches = Vec::with_capacity(self.tracks.len());
        let mut preceding = 0u64;

        for part in self.tracks.iter().filter(|t| !t.samples.is_empty()) {
            let traf = begin_box(buf, b"traf");

            buf.put_u32(16);
            buf.put_slice(b"tfhd");
            buf.put_u32(0x020000); // default-base-is-moof
            buf.put_u32(part.track.track_id);

            buf.put_u32(20);
            buf.put_slice(b"tfdt");
            buf.put_u32(0x0100_0000);
            buf.put_u64(part.base_decode_time);

            buf.put_u32((20 + part.samples.len() * 16) as u32);
            buf.put_slice(b"trun");
            buf.put_u32(0x0100_0000 | TRUN_FLAGS); // version 1: signed composition offsets
            buf.put_u32(part.samples.len() as u32);
            patches.push((buf.len(), preceding));
            buf.put_u32(0);

            for sample in part.samples {
                buf.put_u32(sample.duration);
                buf.put_u32(sample.size);
                buf.put_u32(if sample.is_keyframe {
                    SYNC_SAMPLE_FLAGS
                } else {
                    NON_SYNC_SAMPLE_FLAGS
                });
                buf.put_i32(sample.cts_offset);
            }

            end_box(buf, traf);
            preceding += part.data_size();
        }

        end_box(buf, moof);
        let moof_size = (buf.len() - moof) as u64;

        let data_size = self.data_size();
        let mdat_header = if data_size + 8 > u32::MAX as u64 { 16 } else { 8 };
        for (pos, preceding) in patches {
            let offset = (moof_size + mdat_header + preceding) as u32;
            buf[pos..pos + 4].copy_from_slice(&offset.to_be_bytes());
        }

        if mdat_header == 16 {
            buf.put_u32(1);
            buf.put_slice(b"mdat");
            buf.put_u64(data_size + 16);
        } else {
            buf.put_u32((data_size + 8) as u32);
            buf.put_slice(b"mdat");
        }
    }
}

/// Start a box with a placeholder size; returns its start position.
fn begin_box(buf: &mut BytesMut, kind: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(kind);
    start
}

/// Patch the size of a box opened with [`begin_box`].
fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn put_matrix(buf: &mut BytesMut) {
    for value in [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000u32] {
        buf.put_u32(value);
    }
}

/// Merge samples that sit back to back in the source into single reads.
fn coalesce(samples: &[SampleEntry]) -> Vec<Range<u64>> {
    let mut ranges: Vec<Range<u64>> = Vec::new();
    for sample in samples.iter().filter(|s| s.size > 0) {
        let end = sample.offset + sample.size as u64;
        match ranges.last_mut() {
            Some(last) if last.end == sample.offset => last.end = end,
            _ => ranges.push(sample.offset..end),
        }
    }
    ranges
}
