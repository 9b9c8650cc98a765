//! DVB subtitle elementary stream parser.
//!
//! Subtitle payloads carry no self-describing header the live path cares
//! about: each PES payload is forwarded opaquely, marked `parsed` from
//! construction since the composition-page/ancillary-page ids come from
//! the PMT subtitling descriptor, not the stream itself.

use super::{CodecParser, Frame};
use crate::stream_info::{FrameType, StreamInfo};

pub struct SubtitleParser;

impl SubtitleParser {
    pub fn new() -> Self {
        SubtitleParser
    }
}

impl CodecParser for SubtitleParser {
    fn min_probe_len(&self) -> usize {
        1
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        Some(buf.len())
    }

    fn extract(&mut self, frame: &[u8], info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>) -> Vec<Frame> {
        info.parsed = true;
        vec![Frame {
            data: frame.to_vec(),
            frame_type: FrameType::Unknown,
            pts,
            dts,
        }]
    }
}

/// Teletext elementary stream parser: same opaque-PES forwarding as
/// [`SubtitleParser`], kept as a distinct type since `StreamInfo::new`
/// already marks a teletext stream `parsed` (there's no page/magazine
/// header this live path needs before the client can be told about it).
pub struct TeletextParser;

impl TeletextParser {
    pub fn new() -> Self {
        TeletextParser
    }
}

impl CodecParser for TeletextParser {
    fn min_probe_len(&self) -> usize {
        1
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        Some(buf.len())
    }

    fn extract(&mut self, frame: &[u8], _info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>) -> Vec<Frame> {
        vec![Frame {
            data: frame.to_vec(),
            frame_type: FrameType::Unknown,
            pts,
            dts,
        }]
    }
}
