//! AC-3 / Enhanced AC-3 (ATSC A/52) elementary stream parser.
//!
//! `bsid > 10` selects the E-AC-3 bitstream syntax; the lookup tables below
//! are the standard public A/52 constants (not sourced from this repo's own
//! codec headers, which only cover H.264/H.265/AAC).

use super::{CodecParser, Frame};
use crate::bits::BitReader;
use crate::stream_info::{FrameType, StreamInfo};

const SYNC_WORD: u32 = 0x0B77;
const AC3_HEADER_SIZE: usize = 7;

const SAMPLE_RATES: [u32; 3] = [48000, 44100, 32000];
const CHANNELS_BY_ACMOD: [u8; 8] = [2, 1, 2, 3, 3, 4, 4, 5];
const BITRATES_KBPS: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];
/// frame size in 16-bit words, indexed by [frmsizecod/2][fscod].
const FRAME_SIZE_WORDS: [[u32; 3]; 19] = [
    [96, 69, 64],
    [96, 70, 64],
    [120, 87, 80],
    [120, 88, 80],
    [144, 104, 96],
    [144, 105, 96],
    [168, 121, 112],
    [168, 122, 112],
    [192, 139, 128],
    [192, 140, 128],
    [240, 174, 160],
    [240, 175, 160],
    [288, 208, 192],
    [288, 209, 192],
    [336, 243, 224],
    [336, 244, 224],
    [384, 278, 256],
    [384, 279, 256],
    [512, 372, 384],
];
#[allow(dead_code)]
const EAC3_BLOCKS: [u32; 4] = [1, 2, 3, 6];

pub struct Ac3Parser;

impl Ac3Parser {
    pub fn new() -> Self {
        Ac3Parser
    }
}

struct Header {
    frame_size: usize,
    sample_rate: u32,
    channels: u8,
}

fn parse_classic(r: &mut BitReader) -> Option<Header> {
    r.skip_bits(16); // crc1
    let fscod = r.get_bits(2) as usize;
    let frmsizecod = r.get_bits(6) as usize;
    if fscod == 3 || frmsizecod > 37 {
        return None;
    }
    r.skip_bits(5); // bsid
    r.skip_bits(3); // bsmod
    let acmod = r.get_bits(3) as usize;

    if acmod == 2 {
        r.skip_bits(2); // dsurmod
    } else {
        if (acmod & 1) != 0 && acmod != 1 {
            r.skip_bits(2); // cmixlev
        }
        if (acmod & 4) != 0 {
            r.skip_bits(2); // surmixlev
        }
    }
    let lfeon = r.get_bit() as u8;

    let sample_rate = SAMPLE_RATES[fscod];
    let bit_rate = BITRATES_KBPS[frmsizecod / 2] * 1000;
    let channels = CHANNELS_BY_ACMOD[acmod] + lfeon;
    let frame_size = FRAME_SIZE_WORDS[frmsizecod][fscod] as usize * 2;
    let _ = bit_rate;

    Some(Header {
        frame_size,
        sample_rate,
        channels,
    })
}

fn parse_enhanced(r: &mut BitReader) -> Option<Header> {
    let frame_type = r.get_bits(2);
    const EAC3_FRAME_TYPE_RESERVED: u32 = 3;
    if frame_type == EAC3_FRAME_TYPE_RESERVED {
        return None;
    }
    r.skip_bits(3); // substreamid
    let frame_size_words = (r.get_bits(11) + 1) << 1;
    if (frame_size_words as usize) < AC3_HEADER_SIZE {
        return None;
    }

    let fscod = r.get_bits(2);
    let sample_rate;
    if fscod == 3 {
        let fscod2 = r.get_bits(2);
        if fscod2 == 3 {
            return None;
        }
        sample_rate = SAMPLE_RATES[fscod2 as usize] / 2;
    } else {
        r.get_bits(2); // numblkscod
        sample_rate = SAMPLE_RATES[fscod as usize];
    }

    let acmod = r.get_bits(3) as usize;
    let lfeon = r.get_bit() as u8;
    let channels = CHANNELS_BY_ACMOD[acmod] + lfeon;

    Some(Header {
        frame_size: frame_size_words as usize * 2,
        sample_rate,
        channels,
    })
}

fn parse_header(buf: &[u8]) -> Option<Header> {
    if buf.len() < AC3_HEADER_SIZE {
        return None;
    }
    let mut sync = BitReader::new(buf);
    if sync.get_bits(16) != SYNC_WORD {
        return None;
    }

    let mut probe = BitReader::new(buf);
    probe.skip_bits(16 + 24); // sync word + 24 bits common to both bitstream syntaxes
    let bsid = probe.get_bits(5);

    let mut body = BitReader::new(&buf[2..]); // byte-aligned past the 16-bit sync word
    if bsid > 10 {
        parse_enhanced(&mut body)
    } else {
        parse_classic(&mut body)
    }
}

impl CodecParser for Ac3Parser {
    fn min_probe_len(&self) -> usize {
        AC3_HEADER_SIZE
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        parse_header(buf).map(|h| h.frame_size.max(AC3_HEADER_SIZE))
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
