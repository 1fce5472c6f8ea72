//! MP4 atom definitions.

use super::SampleTable;

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MOOF: Self = Self(*b"moof");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const MVEX: Self = Self(*b"mvex");
    pub const MEHD: Self = Self(*b"mehd");
    pub const TREX: Self = Self(*b"trex");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Atom size including header.
    pub size: u64,
    /// File offset where atom data starts (after header).
    pub data_offset: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl Atom {
    /// Get the data size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// File offset of the first header byte.
    pub fn start(&self) -> u64 {
        self.data_offset - self.header_size as u64
    }

    /// File offset right after this atom.
    pub fn end(&self) -> u64 {
        self.data_offset + self.data_size()
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            b"text" => Self::Text,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        match self {
            Self::Video => *b"vide",
            Self::Audio => *b"soun",
            Self::Hint => *b"hint",
            Self::Meta => *b"meta",
            Self::Text => *b"text",
            Self::Unknown(bytes) => *bytes,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

/// Track information extracted from trak atom.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Track ID.
    pub track_id: u32,
    /// Handler type (video/audio/etc).
    pub handler_type: HandlerType,
    /// Track duration in media timescale.
    pub duration: u64,
    /// Media timescale (ticks per second for this track).
    pub timescale: u32,
    /// Packed ISO-639-2 language code from mdhd.
    pub language: u16,
    /// Sample table with all sample info.
    pub sample_table: SampleTable,
    /// Complete stsd box (header included), copied verbatim into parts.
    pub sample_description: Option<Vec<u8>>,
    /// Media time where presentation starts, from the first non-empty edit.
    pub edit_media_time: u64,
    /// Width (for video tracks).
    pub width: Option<u32>,
    /// Height (for video tracks).
    pub height: Option<u32>,
}

impl TrackInfo {
    /// Create empty track info.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            handler_type: HandlerType::Unknown([0; 4]),
            duration: 0,
            timescale: 1,
            language: 0x55C4, // und
            sample_table: SampleTable::default(),
            sample_description: None,
            edit_media_time: 0,
            width: None,
            height: None,
        }
    }

    /// Duration in seconds, preferring what the samples actually cover.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        let ticks = self.duration.max(self.sample_table.end_dts());
        ticks as f64 / self.timescale as f64
    }

    /// Convert seconds to this track's timescale.
    pub fn secs_to_ticks(&self, secs: f64) -> u64 {
        (secs * self.timescale as f64).round().max(0.0) as u64
    }

    /// Convert ticks of this track's timescale to seconds.
    pub fn ticks_to_secs(&self, ticks: u64) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            ticks as f64 / self.timescale as f64
        }
    }
}
