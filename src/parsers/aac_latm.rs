//! AAC-LATM (MPEG-4 Audio LATM/LOAS) elementary stream parser.
//!
//! Only `audioMuxVersion == 0` `StreamMuxConfig`s are decoded; anything
//! else is treated as an opaque payload the stream's existing descriptors
//! carry forward unchanged (audio config essentially never changes
//! mid-stream, so later LOAS frames omit it).

use super::{CodecParser, Frame};
use crate::bits::BitReader;
use crate::stream_info::{FrameType, StreamInfo};

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];
const CHANNELS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 8];

pub struct AacLatmParser;

impl AacLatmParser {
    pub fn new() -> Self {
        AacLatmParser
    }
}

struct Header {
    frame_size: usize,
    config: Option<(u32, u8)>,
}

fn parse_header(buf: &[u8]) -> Option<Header> {
    if buf.len() < 3 {
        return None;
    }
    let mut r = BitReader::new(buf);
    if r.get_bits(11) != 0x2B7 {
        return None;
    }
    let payload_len = r.get_bits(13) as usize + 3;
    let use_same_mux = r.get_bit();

    let config = if use_same_mux == 0 {
        read_stream_mux_config(&mut r)
    } else {
        None
    };

    Some(Header {
        frame_size: payload_len,
        config,
    })
}

fn read_stream_mux_config(r: &mut BitReader) -> Option<(u32, u8)> {
    if r.get_bit() != 0 {
        return None; // audioMuxVersion != 0, not decoded
    }
    r.skip_bits(1); // allStreamsSameTimeFraming
    r.skip_bits(6); // numSubFrames
    r.skip_bits(4); // numProgram
    r.skip_bits(3); // numLayer

    let aot = r.get_bits(5);
    if aot == 31 {
        r.skip_bits(6); // audioObjectTypeExt
    }

    let sr_idx = r.get_bits(4);
    let sample_rate = if sr_idx == 0xF {
        r.get_bits(24)
    } else if (sr_idx as usize) < SAMPLE_RATES.len() {
        SAMPLE_RATES[sr_idx as usize]
    } else {
        return None;
    };

    let ch_idx = r.get_bits(4);
    let channels = if (ch_idx as usize) < CHANNELS.len() {
        CHANNELS[ch_idx as usize]
    } else {
        0
    };

    let _ = aot;
    Some((sample_rate, channels))
}

impl CodecParser for AacLatmParser {
    fn min_probe_len(&self) -> usize {
        3
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        parse_header(buf).map(|h| h.frame_size)
    }

    fn extract(&mut self, frame: &[u8], info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>) -> Vec<Frame> {
        let Some(header) = parse_header(frame) else {
            return Vec::new();
        };

        if let Some((sample_rate, channels)) = header.config {
            if info.audio.sample_rate != sample_rate || info.audio.channels != channels {
                info.audio.sample_rate = sample_rate;
                info.audio.channels = channels;
            }
            info.parsed = true;
        }

        vec![Frame {
            data: frame.to_vec(),
            frame_type: FrameType::Unknown,
            pts,
            dts,
        }]
    }
}
