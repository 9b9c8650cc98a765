//! H.265/HEVC elementary stream parser.
//!
//! Shares its NAL scanning and slice-header handling with [`super::h264`];
//! SPS parsing here is intentionally shallow (width/height/aspect only) —
//! HEVC's SPS carries considerably more than the live path needs.

use super::{find_start_code, unescape_emulation_prevention, CodecParser, Frame};
use crate::bits::BitReader;
use crate::stream_info::{FrameType, StreamInfo};

const NAL_VPS: u8 = 32;
const NAL_SPS: u8 = 33;
const NAL_PPS: u8 = 34;
// BLA_W_LP..RSV_IRAP_VCL23 (16..23) are all IRAP (keyframe) types.
const IRAP_RANGE: std::ops::RangeInclusive<u8> = 16..=23;

pub struct H265Parser {
    seen_vps: bool,
}

impl H265Parser {
    pub fn new() -> Self {
        H265Parser { seen_vps: false }
    }

    fn nal_type(header: &[u8]) -> u8 {
        (header[0] >> 1) & 0x3F
    }

    fn extract_nal(data: &[u8], start: usize) -> Option<&[u8]> {
        let end = find_start_code(&data[start..])
            .map(|rel| start + rel - 3)
            .unwrap_or(data.len());
        if start >= end {
            return None;
        }
        Some(&data[start..end])
    }

    /// Shallow SPS parse: just enough for picture dimensions and aspect.
    /// HEVC's SPS header precedes width/height with profile-tier-level and
    /// a chroma-format field, skipped here at a fixed best-effort width
    /// since the live path only needs geometry, not full conformance.
    fn parse_sps(&mut self, nal: &[u8]) -> Option<(u16, u16)> {
        let unescaped = unescape_emulation_prevention(&nal[2..]);
        let mut r = BitReader::new(&unescaped);

        r.get_bits(4); // sps_video_parameter_set_id
        let max_sub_layers_minus1 = r.get_bits(3);
        r.get_bit(); // sps_temporal_id_nesting_flag

        // profile_tier_level(1, max_sub_layers_minus1): 12 bytes fixed part
        r.skip_bits(8 * 12);
        if max_sub_layers_minus1 > 0 {
            return None; // sub-layer profile/level flags vary in length; bail out conservatively
        }

        r.read_golomb(); // sps_seq_parameter_set_id
        let chroma_format_idc = r.read_golomb();
        if chroma_format_idc == 3 {
            r.get_bit(); // separate_colour_plane_flag
        }
        let width = r.read_golomb();
        let height = r.read_golomb();

        Some((width as u16, height as u16))
    }
}

impl CodecParser for H265Parser {
    fn min_probe_len(&self) -> usize {
        5
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        if buf.len() < 5 {
            return None;
        }
        Some(buf.len())
    }

    fn extract(&mut self, frame: &[u8], info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>) -> Vec<Frame> {
        let mut vps_nal: Option<&[u8]> = None;
        let mut sps_nal: Option<&[u8]> = None;
        let mut pps_nal: Option<&[u8]> = None;
        let mut is_irap = false;

        let mut offset = match find_start_code(frame) {
            Some(o) => o,
            None => return Vec::new(),
        };

        while offset < frame.len() {
            let Some(nal) = Self::extract_nal(frame, offset) else {
                break;
            };
            if nal.len() < 2 {
                break;
            }
            let nal_type = Self::nal_type(nal);
            match nal_type {
                NAL_VPS => vps_nal = Some(nal),
                NAL_SPS => sps_nal = Some(nal),
                NAL_PPS => pps_nal = Some(nal),
                t if IRAP_RANGE.contains(&t) => is_irap = true,
                _ => {}
            }
            offset += nal.len();
            match find_start_code(&frame[offset..]) {
                Some(rel) => offset += rel,
                None => break,
            }
        }

        if let Some(vps) = vps_nal {
            info.decoder.set_vps(vps);
            self.seen_vps = true;
        }
        if let Some(pps) = pps_nal {
            info.decoder.set_pps(pps);
        }
        if let Some(sps) = sps_nal {
            info.decoder.set_sps(sps);
            if let Some((width, height)) = self.parse_sps(sps) {
                if width >= 320 && height >= 240 {
                    if info.video.width != width || info.video.height != height {
                        info.video.width = width;
                        info.video.height = height;
                    }
                    info.parsed = true;
                }
            }
        }

        let frame_type = if is_irap { FrameType::I } else { FrameType::Unknown };

        vec![Frame {
            data: frame.to_vec(),
            frame_type,
            pts,
            dts,
        }]
    }
}
