//! MP4 file reader with atom parsing.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use super::sample_table::MAX_SAMPLE_COUNT;
use super::{Atom, AtomType, HandlerType, Mp4Error, Mp4File, SampleEntry, SampleTableBuilder, TrackInfo};
use super::Result;

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// trun sample flag marking a non-sync sample
const SAMPLE_IS_NON_SYNC: u32 = 0x0001_0000;

/// Per-track defaults from `trex`.
#[derive(Debug, Clone, Copy, Default)]
struct TrackDefaults {
    duration: u32,
    size: u32,
    flags: u32,
}

/// Values carried by a `tfhd` box.
#[derive(Debug, Clone, Copy, Default)]
struct FragmentHeader {
    track_id: u32,
    base_data_offset: Option<u64>,
    defaults: TrackDefaults,
}

/// MP4 file reader.
pub struct Mp4Reader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    /// Create a new MP4 reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, file_size })
    }

    /// Parse the MP4 file.
    pub fn parse(&mut self) -> Result<Mp4File> {
        let mut mp4 = Mp4File {
            duration: 0,
            timescale: 1000,
            tracks: Vec::new(),
            is_fragmented: false,
        };

        let atoms = self.read_atoms(0, self.file_size)?;

        let moov = atoms
            .iter()
            .find(|a| a.atom_type == AtomType::MOOV)
            .ok_or(Mp4Error::MissingAtom("moov"))?;
        let defaults = self.parse_moov(moov, &mut mp4)?;

        for moof in atoms.iter().filter(|a| a.atom_type == AtomType::MOOF) {
            self.parse_moof(moof, &defaults, &mut mp4)?;
            mp4.is_fragmented = true;
        }

        if mp4.tracks.is_empty() {
            return Err(Mp4Error::invalid_mp4("no tracks with a sample description"));
        }

        Ok(mp4)
    }

    /// Read atoms at the given level.
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while pos + 8 <= end {
            self.reader.seek(SeekFrom::Start(pos))?;

            let mut header = [0u8; 8];
            self.reader.read_exact(&mut header)?;

            let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let atom_type = AtomType([header[4], header[5], header[6], header[7]]);

            let (actual_size, header_size) = if size == 1 {
                // 64-bit extended size
                let mut ext = [0u8; 8];
                self.reader.read_exact(&mut ext)?;
                (u64::from_be_bytes(ext), 16u8)
            } else if size == 0 {
                // Atom extends to end of enclosing range
                (end - pos, 8u8)
            } else {
                (size, 8u8)
            };

            if actual_size < header_size as u64 || pos + actual_size > end {
                return Err(Mp4Error::invalid_mp4(format!(
                    "atom {} at offset {} has invalid size {}",
                    atom_type, pos, actual_size
                )));
            }

            atoms.push(Atom {
                atom_type,
                size: actual_size,
                data_offset: pos + header_size as u64,
                header_size,
            });

            pos += actual_size;
        }

        Ok(atoms)
    }

    fn children(&mut self, parent: &Atom) -> Result<Vec<Atom>> {
        self.read_atoms(parent.data_offset, parent.end())
    }

    /// Read and validate atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Mp4Error::invalid_mp4(format!(
                "Atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        self.reader.seek(SeekFrom::Start(atom.data_offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Read an atom including its header, normalised to a 32-bit size field.
    fn read_whole_atom(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let data = self.read_atom_data(atom)?;
        let mut whole = Vec::with_capacity(data.len() + 8);
        whole.extend_from_slice(&((data.len() + 8) as u32).to_be_bytes());
        whole.extend_from_slice(&atom.atom_type.0);
        whole.extend_from_slice(&data);
        Ok(whole)
    }

    /// Parse moov atom, returning the trex defaults per track.
    fn parse_moov(&mut self, moov: &Atom, mp4: &mut Mp4File) -> Result<HashMap<u32, TrackDefaults>> {
        let children = self.children(moov)?;
        let mut defaults = HashMap::new();

        for child in &children {
            match child.atom_type {
                AtomType::MVHD => self.parse_mvhd(child, mp4)?,
                AtomType::TRAK => {
                    let track = self.parse_trak(child)?;
                    if track.sample_description.is_some() {
                        mp4.tracks.push(track);
                    }
                }
                AtomType::MVEX => {
                    for trex in self.children(child)? {
                        if trex.atom_type == AtomType::TREX {
                            let data = self.read_atom_data(&trex)?;
                            if let (Some(id), Some(duration), Some(size), Some(flags)) = (
                                be_u32(&data, 4),
                                be_u32(&data, 12),
                                be_u32(&data, 16),
                                be_u32(&data, 20),
                            ) {
                                defaults.insert(id, TrackDefaults { duration, size, flags });
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(defaults)
    }

    /// Parse mvhd (movie header).
    fn parse_mvhd(&mut self, atom: &Atom, mp4: &mut Mp4File) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let version = *data.first().ok_or(Mp4Error::MissingAtom("mvhd"))?;

        let (timescale, duration) = if version == 0 {
            (be_u32(&data, 12), be_u32(&data, 16).map(u64::from))
        } else {
            (be_u32(&data, 20), be_u64(&data, 24))
        };

        mp4.timescale = timescale.ok_or_else(|| Mp4Error::invalid_mp4("truncated mvhd"))?;
        mp4.duration = duration.ok_or_else(|| Mp4Error::invalid_mp4("truncated mvhd"))?;
        Ok(())
    }

    /// Parse trak (track) atom.
    fn parse_trak(&mut self, trak: &Atom) -> Result<TrackInfo> {
        let children = self.children(trak)?;
        let mut track = TrackInfo::new(0);

        for child in &children {
            match child.atom_type {
                AtomType::TKHD => self.parse_tkhd(child, &mut track)?,
                AtomType::MDIA => self.parse_mdia(child, &mut track)?,
                AtomType::EDTS => {
                    for elst in self.children(child)? {
                        if elst.atom_type == AtomType::ELST {
                            self.parse_elst(&elst, &mut track)?;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(track)
    }

    /// Parse elst (edit list), keeping the media time of the first non-empty edit.
    fn parse_elst(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let version = data.first().copied().unwrap_or(0);
        let count = be_u32(&data, 4).ok_or_else(|| Mp4Error::invalid_mp4("truncated elst"))?;

        let entry_size = if version == 0 { 12 } else { 20 };
        for i in 0..count as usize {
            let at = 8 + i * entry_size;
            let media_time = if version == 0 {
                be_u32(&data, at + 4).map(|v| i64::from(v as i32))
            } else {
                be_u64(&data, at + 8).map(|v| v as i64)
            };
            let Some(media_time) = media_time else {
                return Err(Mp4Error::invalid_mp4("truncated elst"));
            };
            // -1 marks an empty edit
            if media_time >= 0 {
                track.edit_media_time = media_time as u64;
                break;
            }
        }

        Ok(())
    }

    /// Parse tkhd (track header).
    fn parse_tkhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let version = data.first().copied().unwrap_or(0);

        let (id_at, size_at) = if version == 0 { (12, 76) } else { (20, 88) };
        track.track_id = be_u32(&data, id_at).ok_or_else(|| Mp4Error::invalid_mp4("truncated tkhd"))?;

        // Width and height are 16.16 fixed point
        if let (Some(w), Some(h)) = (be_u32(&data, size_at), be_u32(&data, size_at + 4)) {
            track.width = Some(w >> 16);
            track.height = Some(h >> 16);
        }

        Ok(())
    }

    /// Parse mdia (media) atom.
    fn parse_mdia(&mut self, mdia: &Atom, track: &mut TrackInfo) -> Result<()> {
        let children = self.children(mdia)?;

        // hdlr must be known before stsd is interpreted
        for child in children.iter().filter(|c| c.atom_type == AtomType::HDLR) {
            let data = self.read_atom_data(child)?;
            if let Some(handler) = data.get(8..12) {
                track.handler_type = HandlerType::from_bytes([handler[0], handler[1], handler[2], handler[3]]);
            }
        }

        for child in &children {
            match child.atom_type {
                AtomType::MDHD => self.parse_mdhd(child, track)?,
                AtomType::MINF => {
                    for stbl in self.children(child)? {
                        if stbl.atom_type == AtomType::STBL {
                            self.parse_stbl(&stbl, track)?;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse mdhd (media header).
    fn parse_mdhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let version = data.first().copied().unwrap_or(0);

        let (timescale, duration, language) = if version == 0 {
            (be_u32(&data, 12), be_u32(&data, 16).map(u64::from), be_u16(&data, 20))
        } else {
            (be_u32(&data, 20), be_u64(&data, 24), be_u16(&data, 32))
        };

        track.timescale = timescale.ok_or_else(|| Mp4Error::invalid_mp4("truncated mdhd"))?;
        track.duration = duration.unwrap_or(0);
        if let Some(language) = language {
            track.language = language;
        }

        if track.timescale == 0 {
            return Err(Mp4Error::invalid_mp4(format!(
                "track {} has a zero timescale",
                track.track_id
            )));
        }

        Ok(())
    }

    /// Parse stbl (sample table) atom.
    fn parse_stbl(&mut self, stbl: &Atom, track: &mut TrackInfo) -> Result<()> {
        let children = self.children(stbl)?;
        let mut builder = SampleTableBuilder::new();

        for child in &children {
            match child.atom_type {
                AtomType::STSD => {
                    track.sample_description = Some(self.read_whole_atom(child)?);
                }
                AtomType::STTS => {
                    let data = self.read_atom_data(child)?;
                    builder.set_stts(table_entries(&data, 8, |d, at| {
                        Some((be_u32(d, at)?, be_u32(d, at + 4)?))
                    }));
                }
                AtomType::STSS => {
                    let data = self.read_atom_data(child)?;
                    builder.set_sync_samples(table_entries(&data, 4, be_u32));
                }
                AtomType::STSC => {
                    let data = self.read_atom_data(child)?;
                    builder.set_stsc(table_entries(&data, 12, |d, at| {
                        Some((be_u32(d, at)?, be_u32(d, at + 4)?, be_u32(d, at + 8)?))
                    }));
                }
                AtomType::STSZ => {
                    let data = self.read_atom_data(child)?;
                    let uniform = be_u32(&data, 4).unwrap_or(0);
                    let count = be_u32(&data, 8).unwrap_or(0);
                    if count > MAX_SAMPLE_COUNT {
                        return Err(Mp4Error::invalid_mp4(format!(
                            "stsz declares {} samples, limit is {}",
                            count, MAX_SAMPLE_COUNT
                        )));
                    }
                    let sizes = if uniform == 0 {
                        (0..count as usize)
                            .map_while(|i| be_u32(&data, 12 + i * 4))
                            .collect()
                    } else {
                        Vec::new()
                    };
                    builder.set_stsz(uniform, count, sizes);
                }
                AtomType::STCO => {
                    let data = self.read_atom_data(child)?;
                    builder.set_chunk_offsets(table_entries(&data, 4, |d, at| {
                        be_u32(d, at).map(u64::from)
                    }));
                }
                AtomType::CO64 => {
                    let data = self.read_atom_data(child)?;
                    builder.set_chunk_offsets(table_entries(&data, 8, be_u64));
                }
                AtomType::CTTS => {
                    // Version 0 stores unsigned offsets, version 1 signed; the
                    // bit pattern is the same for every value that fits.
                    let data = self.read_atom_data(child)?;
                    builder.set_ctts(table_entries(&data, 8, |d, at| {
                        Some((be_u32(d, at)?, be_u32(d, at + 4)? as i32))
                    }));
                }
                _ => {}
            }
        }

        track.sample_table = builder.build();
        Ok(())
    }

    /// Parse a moof atom, appending its samples to the matching tracks.
    fn parse_moof(
        &mut self,
        moof: &Atom,
        defaults: &HashMap<u32, TrackDefaults>,
        mp4: &mut Mp4File,
    ) -> Result<()> {
        for traf in self.children(moof)? {
            if traf.atom_type != AtomType::TRAF {
                continue;
            }

            let boxes = self.children(&traf)?;
            let mut header = None;
            let mut base_decode_time = None;

            for child in &boxes {
                match child.atom_type {
                    AtomType::TFHD => {
                        let data = self.read_atom_data(child)?;
                        header = Some(parse_tfhd(&data, defaults)?);
                    }
                    AtomType::TFDT => {
                        let data = self.read_atom_data(child)?;
                        base_decode_time = if data.first() == Some(&1) {
                            be_u64(&data, 4)
                        } else {
                            be_u32(&data, 4).map(u64::from)
                        };
                    }
                    _ => {}
                }
            }

            let header = header.ok_or(Mp4Error::MissingAtom("tfhd"))?;
            let track = mp4
                .tracks
                .iter_mut()
                .find(|t| t.track_id == header.track_id)
                .ok_or_else(|| {
                    Mp4Error::invalid_mp4(format!("fragment for unknown track {}", header.track_id))
                })?;

            let base_offset = header.base_data_offset.unwrap_or_else(|| moof.start());
            let mut next_dts = base_decode_time.unwrap_or_else(|| track.sample_table.end_dts());
            let mut next_offset = base_offset;

            for trun in boxes.iter().filter(|b| b.atom_type == AtomType::TRUN) {
                let data = self.read_atom_data(trun)?;
                let run = parse_trun(&data, &header, base_offset, &mut next_offset, &mut next_dts)?;
                if track.sample_table.samples.len() + run.len() > MAX_SAMPLE_COUNT as usize {
                    return Err(Mp4Error::invalid_mp4(format!(
                        "track {} exceeds {} samples",
                        track.track_id, MAX_SAMPLE_COUNT
                    )));
                }
                track.sample_table.extend_from_run(run);
            }
        }

        Ok(())
    }
}

fn parse_tfhd(data: &[u8], defaults: &HashMap<u32, TrackDefaults>) -> Result<FragmentHeader> {
    let truncated = || Mp4Error::invalid_mp4("truncated tfhd");
    let flags = be_u32(data, 0).ok_or_else(truncated)? & 0x00FF_FFFF;
    let track_id = be_u32(data, 4).ok_or_else(truncated)?;

    let mut header = FragmentHeader {
        track_id,
        base_data_offset: None,
        defaults: defaults.get(&track_id).copied().unwrap_or_default(),
    };

    let mut pos = 8;
    if flags & 0x01 != 0 {
        header.base_data_offset = Some(be_u64(data, pos).ok_or_else(truncated)?);
        pos += 8;
    }
    if flags & 0x02 != 0 {
        pos += 4; // sample description index
    }
    if flags & 0x08 != 0 {
        header.defaults.duration = be_u32(data, pos).ok_or_else(truncated)?;
        pos += 4;
    }
    if flags & 0x10 != 0 {
        header.defaults.size = be_u32(data, pos).ok_or_else(truncated)?;
        pos += 4;
    }
    if flags & 0x20 != 0 {
        header.defaults.flags = be_u32(data, pos).ok_or_else(truncated)?;
    }

    Ok(header)
}

fn parse_trun(
    data: &[u8],
    header: &FragmentHeader,
    base_offset: u64,
    next_offset: &mut u64,
    next_dts: &mut u64,
) -> Result<Vec<SampleEntry>> {
    let truncated = || Mp4Error::invalid_mp4("truncated trun");
    let flags = be_u32(data, 0).ok_or_else(truncated)? & 0x00FF_FFFF;
    let count = be_u32(data, 4).ok_or_else(truncated)? as usize;

    let mut pos = 8;
    if flags & 0x01 != 0 {
        let data_offset = be_u32(data, pos).ok_or_else(truncated)? as i32;
        *next_offset = (base_offset as i64 + data_offset as i64).max(0) as u64;
        pos += 4;
    }
    let first_flags = if flags & 0x04 != 0 {
        let value = be_u32(data, pos).ok_or_else(truncated)?;
        pos += 4;
        Some(value)
    } else {
        None
    };

    let entry_size = [0x100, 0x200, 0x400, 0x800]
        .iter()
        .filter(|&&bit| flags & bit != 0)
        .count()
        * 4;
    if entry_size > 0 && count > data.len().saturating_sub(pos) / entry_size {
        return Err(truncated());
    }
    if count > MAX_SAMPLE_COUNT as usize {
        return Err(Mp4Error::invalid_mp4(format!(
            "trun declares {} samples, limit is {}",
            count, MAX_SAMPLE_COUNT
        )));
    }

    let mut samples = Vec::with_capacity(count);
    for i in 0..count {
        let mut field = |present: bool, default: u32| -> Result<u32> {
            if present {
                let value = be_u32(data, pos).ok_or_else(truncated)?;
                pos += 4;
                Ok(value)
            } else {
                Ok(default)
            }
        };

        let duration = field(flags & 0x100 != 0, header.defaults.duration)?;
        let size = field(flags & 0x200 != 0, header.defaults.size)?;
        let sample_flags = field(flags & 0x400 != 0, header.defaults.flags)?;
        let cts_offset = field(flags & 0x800 != 0, 0)? as i32;

        let sample_flags = match (i, first_flags) {
            (0, Some(first)) => first,
            _ => sample_flags,
        };

        samples.push(SampleEntry {
            index: 0,
            offset: *next_offset,
            size,
            dts: *next_dts,
            duration,
            cts_offset,
            is_keyframe: sample_flags & SAMPLE_IS_NON_SYNC == 0,
        });

        *next_offset += size as u64;
        *next_dts += duration as u64;
    }

    Ok(samples)
}

/// Decode a full-box table: version/flags (4), entry count (4), entries.
fn table_entries<T>(
    data: &[u8],
    entry_size: usize,
    read: impl Fn(&[u8], usize) -> Option<T>,
) -> Vec<T> {
    let count = be_u32(data, 4).unwrap_or(0) as usize;
    (0..count)
        .map_while(|i| read(data, 8 + i * entry_size))
        .collect()
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn be_u64(data: &[u8], at: usize) -> Option<u64> {
    let bytes = data.get(at..at + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_missing_moov_is_an_error() {
        let file = atom(b"ftyp", b"isom\0\0\0\0");
        let err = Mp4File::parse(&mut Cursor::new(file)).unwrap_err();
        assert!(matches!(err, Mp4Error::MissingAtom("moov")));
    }

    #[test]
    fn test_oversized_atom_is_an_error() {
        let mut file = atom(b"ftyp", b"isom\0\0\0\0");
        file.extend_from_slice(&1000u32.to_be_bytes());
        file.extend_from_slice(b"moov");
        let err = Mp4File::parse(&mut Cursor::new(file)).unwrap_err();
        assert!(matches!(err, Mp4Error::InvalidMp4(_)));
    }

    #[test]
    fn test_garbage_is_an_error() {
        let err = Mp4File::parse(&mut Cursor::new(b"not an mp4 at all".to_vec())).unwrap_err();
        assert!(matches!(err, Mp4Error::InvalidMp4(_) | Mp4Error::MissingAtom(_)));
    }

    #[test]
    fn test_table_entries_stops_at_truncation() {
        // Claims 3 entries but only carries 2
        let mut data = vec![0, 0, 0, 0, 0, 0, 0, 3];
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&9u32.to_be_bytes());
        assert_eq!(table_entries(&data, 4, be_u32), vec![7, 9]);
    }

    #[test]
    fn test_trun_with_defaults_and_first_flags() {
        let header = FragmentHeader {
            track_id: 1,
            base_data_offset: None,
            defaults: TrackDefaults {
                duration: 512,
                size: 10,
                flags: SAMPLE_IS_NON_SYNC,
            },
        };

        // flags: data-offset + first-sample-flags, 3 samples
        let mut data = 0x0000_0005u32.to_be_bytes().to_vec();
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(&0x0200_0000u32.to_be_bytes());

        let mut offset = 0;
        let mut dts = 1024;
        let samples = parse_trun(&data, &header, 1000, &mut offset, &mut dts).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].offset, 1100);
        assert_eq!(samples[2].offset, 1120);
        assert_eq!(samples[0].dts, 1024);
        assert_eq!(samples[2].dts, 2048);
        assert!(samples[0].is_keyframe);
        assert!(!samples[1].is_keyframe);
        assert_eq!(dts, 2560);
    }

    fn header_with_defaults() -> FragmentHeader {
        FragmentHeader {
            track_id: 1,
            base_data_offset: None,
            defaults: TrackDefaults {
                duration: 512,
                size: 10,
                flags: 0,
            },
        }
    }

    #[test]
    fn test_trun_count_beyond_box_is_an_error() {
        // Per-sample sizes, claims u32::MAX samples, carries none
        let mut data = 0x0000_0200u32.to_be_bytes().to_vec();
        data.extend_from_slice(&u32::MAX.to_be_bytes());

        let (mut offset, mut dts) = (0, 0);
        let err = parse_trun(&data, &header_with_defaults(), 0, &mut offset, &mut dts).unwrap_err();
        assert!(matches!(err, Mp4Error::InvalidMp4(_)));
    }

    #[test]
    fn test_trun_huge_default_only_count_is_an_error() {
        // No per-sample fields, so the box size cannot bound the count
        let mut data = 0u32.to_be_bytes().to_vec();
        data.extend_from_slice(&u32::MAX.to_be_bytes());

        let (mut offset, mut dts) = (0, 0);
        let err = parse_trun(&data, &header_with_defaults(), 0, &mut offset, &mut dts).unwrap_err();
        assert!(matches!(err, Mp4Error::InvalidMp4(_)));
    }

    #[test]
    fn test_huge_uniform_stsz_count_is_an_error() {
        let stsz = {
            let mut body = vec![0u8; 4];
            body.extend_from_slice(&1u32.to_be_bytes());
            body.extend_from_slice(&u32::MAX.to_be_bytes());
            atom(b"stsz", &body)
        };
        let stbl = atom(b"stbl", &stsz);
        let minf = atom(b"minf", &stbl);
        let mdia = atom(b"mdia", &minf);
        let trak = atom(b"trak", &mdia);
        let mut file = atom(b"ftyp", b"isom\0\0\0\0");
        file.extend(atom(b"moov", &trak));

        let err = Mp4File::parse(&mut Cursor::new(file)).unwrap_err();
        assert!(matches!(err, Mp4Error::InvalidMp4(_)));
    }
}
