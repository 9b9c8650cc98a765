//! Bundle of per-PID demuxers making up one program's complete stream set.

use super::pid_demuxer::PidDemuxer;
use super::TsHeader;
use crate::parsers::Frame;
use crate::stream_info::{Content, StreamBundle, StreamInfo, StreamType};

const VIDEO_MASK: u32 = 0x8000_0000;
const AUDIO_MASK: u32 = 0x0080_0000;
const SUBTITLE_MASK: u32 = 0x0040_0000;
const LANGUAGE_MASK: u32 = 0x0020_0000;
const STREAMTYPE_MASK: u32 = 0x0010_0000;
const AUDIOTYPE_MASK: u32 = 0x000F_0000;
const PID_MASK: u32 = 0x0000_FFFF;

/// Owns one [`PidDemuxer`] per elementary stream PID and routes incoming TS
/// packets by PID.
#[derive(Default)]
pub struct DemuxerBundle {
    demuxers: Vec<PidDemuxer>,
}

impl DemuxerBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.demuxers.clear();
    }

    pub fn len(&self) -> usize {
        self.demuxers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demuxers.is_empty()
    }

    /// True once every demuxer has parsed enough to describe its stream.
    pub fn is_ready(&self) -> bool {
        !self.demuxers.is_empty() && self.demuxers.iter().all(|d| d.is_parsed())
    }

    fn find_index(&self, pid: u16) -> Option<usize> {
        self.demuxers.iter().position(|d| d.info.pid == pid)
    }

    /// Content class of the stream at `pid`, if this bundle has one.
    pub fn content_of(&self, pid: u16) -> Option<Content> {
        self.find_index(pid).map(|idx| self.demuxers[idx].info.content())
    }

    /// Routes one TS packet to the demuxer owning its PID, if any.
    pub fn process_ts_packet(&mut self, header: &TsHeader, packet: &[u8]) -> Vec<Frame> {
        match self.find_index(header.pid) {
            Some(idx) => self.demuxers[idx].process_ts_packet(header, packet),
            None => Vec::new(),
        }
    }

    /// Replaces the bundle's contents with `bundle`, carrying forward any
    /// demuxer whose `StreamInfo` is unchanged (same PID, compatible type)
    /// so in-flight decoder state (SPS/PPS, sample rate, ...) survives a
    /// PMT version bump that didn't actually touch that stream.
    pub fn update_from(&mut self, bundle: &StreamBundle) {
        let mut next = Vec::with_capacity(bundle.len());
        for info in bundle.iter() {
            if let Some(idx) = self.find_index(info.pid) {
                if self.demuxers[idx].info.is_meta_of(info) {
                    next.push(self.demuxers.swap_remove(idx));
                    continue;
                }
            }
            next.push(PidDemuxer::new(info.clone()));
        }
        self.demuxers = next;
    }

    /// Current descriptor for every stream, in the order streams were
    /// added (video first, the source's convention).
    pub fn stream_infos(&self) -> Vec<&StreamInfo> {
        self.demuxers.iter().map(|d| &d.info).collect()
    }

    /// Computes the reorder key the source uses to present video before
    /// audio before subtitles. Language matching applies across every
    /// content class, not just audio; `preferred_stream_type` and
    /// `preferred_audio_type` are independent tiebreaks scoped to audio
    /// (codec choice vs. main/description track selection).
    pub fn reorder_key(
        info: &StreamInfo,
        preferred_language: &str,
        preferred_audio_type: u8,
        preferred_stream_type: StreamType,
    ) -> u32 {
        let mut key = (0xFFFF - (info.pid as u32 & PID_MASK)) & PID_MASK;
        if info.language == preferred_language {
            key |= LANGUAGE_MASK;
        }
        match info.content() {
            Content::Video => key |= VIDEO_MASK,
            Content::Audio => {
                key |= AUDIO_MASK;
                if info.stream_type == preferred_stream_type {
                    key |= STREAMTYPE_MASK;
                }
                key |= (4 - info.audio_type.min(4) as u32) << 16 & AUDIOTYPE_MASK;
            }
            Content::Subtitle => key |= SUBTITLE_MASK,
            Content::Teletext | Content::None => {}
        }
        key
    }

    /// Returns stream descriptors sorted by [`reorder_key`], highest first
    /// (video, then preferred-language audio, then the rest, then
    /// subtitles).
    pub fn reordered_stream_infos(
        &self,
        preferred_language: &str,
        preferred_audio_type: u8,
        preferred_stream_type: StreamType,
    ) -> Vec<&StreamInfo> {
        let mut infos = self.stream_infos();
        infos.sort_by(|a, b| {
            Self::reorder_key(b, preferred_language, preferred_audio_type, preferred_stream_type)
                .cmp(&Self::reorder_key(a, preferred_language, preferred_audio_type, preferred_stream_type))
        });
        infos
    }
}
