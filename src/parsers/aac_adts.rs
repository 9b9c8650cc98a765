//! AAC-ADTS elementary stream parser.
//!
//! The header this crate reads is 9 bytes (sync + CRC field), matching the
//! head-end's own convention rather than the 7-byte CRC-absent ADTS header
//! some encoders emit; `protection_absent` is read but not branched on for
//! header length, so streams that genuinely omit the CRC still parse (the
//! two trailing bytes are simply unused padding in that case).

use super::{CodecParser, Frame};
use crate::bits::BitReader;
use crate::stream_info::{FrameType, StreamInfo};

const HEADER_SIZE: usize = 9;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];
/// MPEG-4 `channelConfiguration` table; index 0 (AOT-specific) is unused here.
const CHANNELS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 8];

pub struct AacAdtsParser;

impl AacAdtsParser {
    pub fn new() -> Self {
        AacAdtsParser
    }
}

struct Header {
    frame_size: usize,
    sample_rate: u32,
    channels: u8,
}

fn parse_header(buf: &[u8]) -> Option<Header> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    let mut r = BitReader::new(buf);
    if r.get_bits(12) != 0xFFF {
        return None;
    }
    r.skip_bits(1); // MPEG version
    let layer = r.get_bits(2);
    if layer != 0 {
        return None;
    }
    r.skip_bits(1); // protection_absent
    r.skip_bits(2); // profile (AOT)
    let sr_idx = r.get_bits(4) as usize;
    if sr_idx == 15 || sr_idx >= SAMPLE_RATES.len() {
        return None;
    }
    r.skip_bits(1); // private_bit
    let ch_idx = r.get_bits(3) as usize;
    if ch_idx > 7 {
        return None;
    }
    r.skip_bits(4); // original/copy + home + copyright_id_bit + copyright_id_start
    let frame_size = r.get_bits(13) as usize;
    if frame_size < HEADER_SIZE {
        return None;
    }

    Some(Header {
        frame_size,
        sample_rate: SAMPLE_RATES[sr_idx],
        channels: CHANNELS[ch_idx],
    })
}

impl CodecParser for AacAdtsParser {
    fn min_probe_len(&self) -> usize {
        HEADER_SIZE
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        parse_header(buf).map(|h| h.frame_size)
    }

    fn extract(&mut self, frame: &[u8], info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>) -> Vec<Frame> {
        let Some(header) = parse_header(frame) else {
            return Vec::new();
        };

        if info.audio.sample_rate != header.sample_rate || info.audio.channels != header.channels {
            info.audio.sample_rate = header.sample_rate;
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

    fn build_header(sr_idx: u8, ch_idx: u8, frame_size: u16) -> Vec<u8> {
        let mut bits = Vec::new();
        bits.extend(std::iter::repeat(1u8).take(12)); // sync
        bits.push(0); // version
        bits.extend([0, 0]); // layer
        bits.push(0); // protection_absent
        bits.extend([0, 1]); // profile = 1 (LC), 2 bits
        for i in (0..4).rev() {
            bits.push((sr_idx >> i) & 1);
        }
        bits.push(0); // private_bit
        for i in (0..3).rev() {
            bits.push((ch_idx >> i) & 1);
        }
        bits.extend([0, 0, 0, 0]);
        for i in (0..13).rev() {
            bits.push(((frame_size >> i) & 1) as u8);
        }
        while bits.len() % 8 != 0 || bits.len() < HEADER_SIZE * 8 {
            bits.push(0);
        }
        let mut bytes = vec![0u8; bits.len() / 8];
        for (i, bit) in bits.iter().enumerate() {
            if *bit == 1 {
                bytes[i / 8] |= 1 << (7 - (i % 8));
            }
        }
        bytes
    }

    #[test]
    fn parses_valid_header() {
        let buf = build_header(3, 1, 200); // 48kHz, mono
        let header = parse_header(&buf).unwrap();
        assert_eq!(header.sample_rate, 48000);
        assert_eq!(header.channels, 1);
        assert_eq!(header.frame_size, 200);
    }

    #[test]
    fn rejects_bad_sync() {
        let mut buf = build_header(3, 1, 200);
        buf[0] = 0;
        assert!(parse_header(&buf).is_none());
    }

    #[test]
    fn rejects_reserved_sample_rate_index() {
        let buf = build_header(15, 1, 200);
        assert!(parse_header(&buf).is_none());
    }
}
