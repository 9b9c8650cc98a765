//! MPEG-1/2 Layer II audio elementary stream parser (ISO/IEC 11172-3).

use super::{CodecParser, Frame};
use crate::stream_info::{FrameType, StreamInfo};

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];
const SAMPLE_RATES_V2: [u32; 3] = [22050, 24000, 16000];
const BITRATES_L2: [u32; 16] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0,
];

pub struct MpegAudioParser;

impl MpegAudioParser {
    pub fn new() -> Self {
        MpegAudioParser
    }
}

struct Header {
    frame_size: usize,
    sample_rate: u32,
    bit_rate: u32,
    channels: u8,
}

fn parse_header(buf: &[u8]) -> Option<Header> {
    if buf.len() < 4 || buf[0] != 0xFF || (buf[1] & 0xE0) != 0xE0 {
        return None;
    }
    let version_bits = (buf[1] >> 3) & 0x03;
    let layer_bits = (buf[1] >> 1) & 0x03;
    if layer_bits != 0b10 {
        return None; // only Layer II is handled on the live path
    }

    let bitrate_idx = (buf[2] >> 4) as usize;
    let sr_idx = ((buf[2] >> 2) & 0x03) as usize;
    if bitrate_idx == 0 || bitrate_idx == 15 || sr_idx == 3 {
        return None;
    }
    let padding = (buf[2] >> 1) & 0x01;
    let channel_mode = (buf[3] >> 6) & 0x03;

    let sample_rate = if version_bits == 0b11 {
        SAMPLE_RATES_V1[sr_idx]
    } else {
        SAMPLE_RATES_V2[sr_idx]
    };
    let bit_rate = BITRATES_L2[bitrate_idx] * 1000;
    if bit_rate == 0 || sample_rate == 0 {
        return None;
    }

    let frame_size = (144 * bit_rate / sample_rate + padding as u32) as usize;
    let channels = if channel_mode == 3 { 1 } else { 2 };

    Some(Header {
        frame_size,
        sample_rate,
        bit_rate,
        channels,
    })
}

impl CodecParser for MpegAudioParser {
    fn min_probe_len(&self) -> usize {
        4
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        parse_header(buf).map(|h| h.frame_size)
    }

    fn extract(&mut self, frame: &[u8], info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>) -> Vec<Frame> {
        let Some(header) = parse_header(frame) else {
            return Vec::new();
        };

        if info.audio.sample_rate != header.sample_rate
            || info.audio.bit_rate != header.bit_rate
            || info.audio.channels != header.channels
        {
            info.audio.sample_rate = header.sample_rate;
            info.audio.bit_rate = header.bit_rate;
            info.audio.channels = header.channels;
        }
        info.parsed = true;

        vec![Frame {
            data: frame.to_vec(),
            frame_type: FrameType::Unknown,
            pts,
            dts,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_layer2_headers() {
        // layer bits 01 = Layer III, not handled here
        let buf = [0xFF, 0xFB, 0x90, 0x00];
        assert!(parse_header(&buf).is_none());
    }
}
