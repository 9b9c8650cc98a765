//! Per-elementary-stream descriptor and the PID-keyed bundle of them.

use std::collections::BTreeMap;

/// Coarse stream content class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Content {
    None,
    Video,
    Audio,
    Subtitle,
    Teletext,
}

/// Concrete elementary-stream codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    None,
    Mpeg2Audio,
    Ac3,
    Eac3,
    Aac,
    Latm,
    Mpeg2Video,
    H264,
    H265,
    DvbSub,
    Teletext,
}

impl StreamType {
    /// The content class a stream type always implies.
    pub fn content(self) -> Content {
        match self {
            StreamType::Mpeg2Video | StreamType::H264 | StreamType::H265 => Content::Video,
            StreamType::Mpeg2Audio | StreamType::Ac3 | StreamType::Eac3 | StreamType::Aac | StreamType::Latm => {
                Content::Audio
            }
            StreamType::DvbSub => Content::Subtitle,
            StreamType::Teletext => Content::Teletext,
            StreamType::None => Content::None,
        }
    }

    /// Human-readable name used in the wire protocol's `typeName` field.
    pub fn type_name(self) -> &'static str {
        match self {
            StreamType::None => "NONE",
            StreamType::Mpeg2Audio => "MPEG2AUDIO",
            StreamType::Ac3 => "AC3",
            StreamType::Eac3 => "EAC3",
            StreamType::Aac => "AAC",
            StreamType::Latm => "LATM",
            StreamType::Mpeg2Video => "MPEG2VIDEO",
            StreamType::H264 => "H264",
            StreamType::H265 => "H265",
            StreamType::DvbSub => "DVBSUB",
            StreamType::Teletext => "TELETEXT",
        }
    }

    /// AC3 and EAC3 are considered meta-compatible for `StreamInfo` equality
    /// purposes: a channel switching between the two doesn't count as a
    /// stream-bundle change by type alone.
    fn ac3_compatible(self, other: StreamType) -> bool {
        matches!(
            (self, other),
            (StreamType::Ac3, StreamType::Eac3) | (StreamType::Eac3, StreamType::Ac3)
        )
    }
}

/// Coded access-unit classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Unknown,
    I,
    P,
    B,
    D,
}

const MAX_DECODER_BLOB: usize = 128;

/// Audio-specific descriptors, valid once `parsed`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioDescriptor {
    pub channels: u8,
    pub sample_rate: u32,
    pub bit_rate: u32,
}

/// Video-specific descriptors, valid once `parsed`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoDescriptor {
    pub fps_scale: u32,
    pub fps_rate: u32,
    pub width: u16,
    pub height: u16,
    /// Display aspect ratio, ×10000 (e.g. 1.7777 → 17777).
    pub aspect: i64,
}

/// Subtitle-specific descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleDescriptor {
    pub subtitling_type: u8,
    pub composition_page_id: u32,
    pub ancillary_page_id: u32,
}

/// Decoder configuration blobs (SPS/PPS/VPS), each capped at 128 bytes as
/// the wire protocol encodes their length in a single byte.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoderData {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
    pub vps: Vec<u8>,
}

impl DecoderData {
    fn set_capped(slot: &mut Vec<u8>, data: &[u8]) {
        if data.len() <= MAX_DECODER_BLOB {
            slot.clear();
            slot.extend_from_slice(data);
        }
    }

    pub fn set_sps(&mut self, data: &[u8]) {
        Self::set_capped(&mut self.sps, data);
    }

    pub fn set_pps(&mut self, data: &[u8]) {
        Self::set_capped(&mut self.pps, data);
    }

    pub fn set_vps(&mut self, data: &[u8]) {
        Self::set_capped(&mut self.vps, data);
    }
}

/// Immutable-by-value descriptor of one elementary stream.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub pid: u16,
    pub stream_type: StreamType,
    /// Three-letter ISO 639 language code; empty when undefined.
    pub language: String,
    pub audio: AudioDescriptor,
    pub video: VideoDescriptor,
    pub subtitle: SubtitleDescriptor,
    pub decoder: DecoderData,
    pub audio_type: u8,
    /// Set once this stream's content-specific descriptors have been filled
    /// in by its parser.
    pub parsed: bool,
}

impl StreamInfo {
    pub fn new(pid: u16, stream_type: StreamType, language: impl Into<String>) -> Self {
        StreamInfo {
            pid,
            stream_type,
            language: language.into(),
            audio: AudioDescriptor::default(),
            video: VideoDescriptor::default(),
            subtitle: SubtitleDescriptor::default(),
            decoder: DecoderData::default(),
            audio_type: 0,
            parsed: stream_type == StreamType::Teletext,
        }
    }

    pub fn content(&self) -> Content {
        self.stream_type.content()
    }

    /// Same PID, same (AC3/EAC3-compatible) type, same content-specific
    /// descriptors. Used to decide whether a demuxer must be rebuilt across
    /// a PMT version bump.
    pub fn is_meta_of(&self, other: &StreamInfo) -> bool {
        self.pid == other.pid
            && (self.stream_type == other.stream_type || self.stream_type.ac3_compatible(other.stream_type))
    }
}

impl PartialEq for StreamInfo {
    fn eq(&self, other: &Self) -> bool {
        self.is_meta_of(other)
            && self.audio == other.audio
            && self.video == other.video
            && self.subtitle == other.subtitle
    }
}

/// Mapping PID → `StreamInfo`, insertion-ordered, with at most one video
/// stream.
#[derive(Debug, Clone, Default)]
pub struct StreamBundle {
    order: Vec<u16>,
    streams: BTreeMap<u16, StreamInfo>,
    /// Set when any insert changed the value previously stored at that PID.
    pub changed: bool,
}

impl StreamBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `info`, preserving insertion order. A second video stream on
    /// a different PID than any existing video stream is rejected.
    pub fn add_stream(&mut self, info: StreamInfo) -> bool {
        if info.content() == Content::Video {
            if let Some(existing_video_pid) = self.video_pid() {
                if existing_video_pid != info.pid {
                    return false;
                }
            }
        }

        let differs = match self.streams.get(&info.pid) {
            Some(existing) => existing != &info,
            None => true,
        };

        if !self.streams.contains_key(&info.pid) {
            self.order.push(info.pid);
        }
        self.streams.insert(info.pid, info);
        self.changed |= differs;
        true
    }

    fn video_pid(&self) -> Option<u16> {
        self.order
            .iter()
            .find(|pid| self.streams.get(pid).map(|s| s.content() == Content::Video).unwrap_or(false))
            .copied()
    }

    pub fn get(&self, pid: u16) -> Option<&StreamInfo> {
        self.streams.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StreamInfo> {
        self.order.iter().filter_map(move |pid| self.streams.get(pid))
    }
}
