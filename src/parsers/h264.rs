//! H.264/AVC elementary stream parser.
//!
//! Operates on one PES payload at a time: the whole buffered packet is the
//! candidate frame, and NAL units inside it are scanned to find the active
//! SPS/PPS/slice header. Top-field-first interlaced streams are buffered
//! across one field pair before being sent as a single access unit.

use super::{find_start_code, unescape_emulation_prevention, CodecParser, Frame};
use crate::bits::BitReader;
use crate::stream_info::{FrameType, StreamInfo};

const NAL_SLICE_NON_IDR: u8 = 1;
const NAL_SLICE_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;

/// 17-entry VUI `aspect_ratio_idc` table; index 0 is unused (reserved).
const ASPECT_RATIOS: [f64; 17] = [
    0.0,
    1.0,
    12.0 / 11.0,
    10.0 / 11.0,
    16.0 / 11.0,
    40.0 / 33.0,
    24.0 / 11.0,
    20.0 / 11.0,
    32.0 / 11.0,
    80.0 / 33.0,
    18.0 / 11.0,
    15.0 / 11.0,
    64.0 / 33.0,
    160.0 / 99.0,
    4.0 / 3.0,
    3.0 / 2.0,
    2.0 / 1.0,
];
const EXTENDED_SAR: u32 = 255;

const HIGH_PROFILES: [u8; 10] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138];

#[derive(Default)]
struct FieldAssembly {
    buffer: Vec<u8>,
    active: bool,
}

pub struct H264Parser {
    log2_max_frame_num_minus4: u32,
    progressive: bool,
    field_assembly: FieldAssembly,
    last_sps_video_info: Option<VideoInfo>,
}

impl H264Parser {
    pub fn new() -> Self {
        H264Parser {
            log2_max_frame_num_minus4: 0,
            progressive: true,
            field_assembly: FieldAssembly::default(),
            last_sps_video_info: None,
        }
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

    fn parse_sps(&mut self, nal: &[u8]) {
        let unescaped = unescape_emulation_prevention(&nal[1..]);
        let mut r = BitReader::new(&unescaped);

        let profile_idc = r.get_bits(8) as u8;
        r.skip_bits(8); // constraint_set flags (6) + reserved_zero (2)
        let _level_idc = r.get_bits(8);
        r.read_golomb(); // seq_parameter_set_id

        if HIGH_PROFILES.contains(&profile_idc) {
            let chroma_format_idc = r.read_golomb();
            if chroma_format_idc == 3 {
                r.get_bit(); // separate_colour_plane_flag
            }
            r.read_golomb(); // bit_depth_luma_minus8
            r.read_golomb(); // bit_depth_chroma_minus8
            r.get_bit(); // qpprime_y_zero_transform_bypass_flag
            if r.get_bit() == 1 {
                let count = if chroma_format_idc != 3 { 8 } else { 12 };
                for i in 0..count {
                    if r.get_bit() == 1 {
                        let size = if i < 6 { 16 } else { 64 };
                        Self::skip_scaling_list(&mut r, size);
                    }
                }
            }
        }

        self.log2_max_frame_num_minus4 = r.read_golomb();
        let pic_order_cnt_type = r.read_golomb();
        if pic_order_cnt_type == 0 {
            r.read_golomb(); // log2_max_pic_order_cnt_lsb_minus4
        } else if pic_order_cnt_type == 1 {
            r.get_bit(); // delta_pic_order_always_zero_flag
            r.read_signed_golomb(); // offset_for_non_ref_pic
            r.read_signed_golomb(); // offset_for_top_to_bottom_field
            let n = r.read_golomb();
            for _ in 0..n {
                r.read_signed_golomb();
            }
        }

        r.read_golomb(); // max_num_ref_frames
        r.get_bit(); // gaps_in_frame_num_value_allowed_flag

        let width_mbs = r.read_golomb() + 1;
        let height_map_units = r.read_golomb() + 1;
        self.progressive = r.get_bit() == 1;

        let mut width = width_mbs * 16;
        let mut height = height_map_units * 16 * if self.progressive { 1 } else { 2 };

        if !self.progressive {
            r.get_bit(); // mb_adaptive_frame_field_flag
        }
        r.get_bit(); // direct_8x8_inference_flag

        if r.get_bit() == 1 {
            let crop_left = r.read_golomb();
            let crop_right = r.read_golomb();
            let crop_top = r.read_golomb();
            let crop_bottom = r.read_golomb();
            let vertical_mult = if self.progressive { 2 } else { 4 };
            width -= (crop_left + crop_right) * 2;
            height -= (crop_top + crop_bottom) * vertical_mult;
        }

        let mut aspect = 0i64;
        let mut duration = 0u32;
        let mut fps_rate = 0u32;
        let mut fps_scale = 0u32;

        if r.get_bit() == 1 {
            // vui_parameters_present_flag
            if r.get_bit() == 1 {
                // aspect_ratio_info_present_flag
                let idc = r.get_bits(8);
                let par = if idc == EXTENDED_SAR {
                    let num = r.get_bits(16) as f64;
                    let den = r.get_bits(16) as f64;
                    if den != 0.0 {
                        num / den
                    } else {
                        0.0
                    }
                } else if (idc as usize) < ASPECT_RATIOS.len() {
                    ASPECT_RATIOS[idc as usize]
                } else {
                    0.0
                };
                let dar = par * (width as f64) / (height.max(1) as f64);
                aspect = (dar * 10000.0) as i64;
            }

            if r.get_bit() == 1 {
                // overscan_info_present_flag
                r.get_bit();
            }

            if r.get_bit() == 1 {
                // video_signal_type_present_flag
                r.skip_bits(4); // video_format(3) + video_full_range_flag(1)
                if r.get_bit() == 1 {
                    // colour_description_present_flag
                    r.skip_bits(24);
                }
            }

            if r.get_bit() == 1 {
                // chroma_loc_info_present_flag
                r.read_golomb();
                r.read_golomb();
            }

            if r.get_bit() == 1 {
                // timing_info_present_flag
                let mut num_units_in_tick = r.get_bits(32);
                let time_scale = r.get_bits(32);
                let fixed_frame_rate = r.get_bit() == 1;
                if fixed_frame_rate && time_scale != 0 {
                    num_units_in_tick *= 2;
                    duration = (90_000u64 * num_units_in_tick as u64 / time_scale as u64) as u32;
                    fps_rate = time_scale;
                    fps_scale = num_units_in_tick;
                }
            }
        }

        self.last_sps_video_info = Some(VideoInfo {
            width: width as u16,
            height: height as u16,
            aspect,
            fps_rate,
            fps_scale,
            duration,
        });
    }

    fn skip_scaling_list(r: &mut BitReader, size: u32) {
        let mut last_scale = 8i32;
        let mut next_scale = 8i32;
        for _ in 0..size {
            if next_scale != 0 {
                let delta = r.read_signed_golomb();
                next_scale = (last_scale + delta + 256) % 256;
            }
            last_scale = if next_scale == 0 { last_scale } else { next_scale };
        }
    }

    fn parse_slice_header(&self, nal: &[u8]) -> (FrameType, bool) {
        let cap = nal.len().min(20);
        let mut r = BitReader::new(&nal[1..cap.max(1)]);

        r.read_golomb(); // first_mb_in_slice
        let mut slice_type = r.read_golomb();
        if slice_type > 4 {
            slice_type -= 5;
        }
        r.read_golomb(); // pic_parameter_set_id
        r.skip_bits(self.log2_max_frame_num_minus4 + 4); // frame_num

        let mut bottom_field = false;
        if !self.progressive {
            let field_flag = r.get_bit() == 1;
            if field_flag {
                bottom_field = r.get_bit() == 1;
            }
        }

        let frame_type = if bottom_field {
            FrameType::Unknown
        } else {
            match slice_type {
                0 => FrameType::P,
                1 => FrameType::B,
                2 => FrameType::I,
                _ => FrameType::Unknown,
            }
        };

        (frame_type, bottom_field)
    }
}

struct VideoInfo {
    width: u16,
    height: u16,
    aspect: i64,
    fps_rate: u32,
    fps_scale: u32,
    #[allow(dead_code)]
    duration: u32,
}

impl CodecParser for H264Parser {
    fn min_probe_len(&self) -> usize {
        4
    }

    fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        if buf.len() < 4 {
            return None;
        }
        Some(buf.len())
    }

    fn extract(&mut self, frame: &[u8], info: &mut StreamInfo, pts: Option<i64>, dts: Option<i64>) -> Vec<Frame> {
        let mut sps_nal: Option<&[u8]> = None;
        let mut pps_nal: Option<&[u8]> = None;
        let mut slh_nal: Option<&[u8]> = None;
        let mut is_idr = false;

        let mut offset = match find_start_code(frame) {
            Some(o) => o,
            None => return Vec::new(),
        };

        while offset < frame.len() {
            let Some(nal) = Self::extract_nal(frame, offset) else {
                break;
            };
            if nal.is_empty() {
                break;
            }
            let nal_type = nal[0] & 0x1F;
            match nal_type {
                NAL_SPS => sps_nal = Some(nal),
                NAL_PPS => pps_nal = Some(nal),
                NAL_SLICE_IDR => {
                    slh_nal = Some(nal);
                    is_idr = true;
                }
                NAL_SLICE_NON_IDR => slh_nal = Some(nal),
                _ => {}
            }
            offset += nal.len();
            // advance past this NAL's start code to look for the next one
            match find_start_code(&frame[offset..]) {
                Some(rel) => offset += rel,
                None => break,
            }
        }

        if let Some(pps) = pps_nal {
            info.decoder.set_pps(pps);
        }
        if let Some(sps) = sps_nal {
            info.decoder.set_sps(sps);
            self.last_sps_video_info = None;
            self.parse_sps(sps);
            if let Some(v) = self.last_sps_video_info.take() {
                if v.width >= 320 && v.height >= 240 && v.aspect >= 0 {
                    if info.video.width != v.width
                        || info.video.height != v.height
                        || info.video.aspect != v.aspect
                        || info.video.fps_scale != v.fps_scale
                        || info.video.fps_rate != v.fps_rate
                    {
                        info.video.width = v.width;
                        info.video.height = v.height;
                        info.video.aspect = v.aspect;
                        info.video.fps_scale = v.fps_scale;
                        info.video.fps_rate = v.fps_rate;
                    }
                    info.parsed = true;
                }
            }
        }
        let (mut frame_type, bottom_field) = match slh_nal {
            Some(slh) => self.parse_slice_header(slh),
            None => (FrameType::Unknown, false),
        };
        if is_idr {
            frame_type = FrameType::I;
        }

        if self.progressive || slh_nal.is_none() {
            return vec![Frame {
                data: frame.to_vec(),
                frame_type,
                pts,
                dts,
            }];
        }

        if !bottom_field {
            self.field_assembly.buffer.clear();
            self.field_assembly.buffer.extend_from_slice(frame);
            self.field_assembly.active = true;
            return Vec::new();
        }

        if self.field_assembly.active {
            self.field_assembly.buffer.extend_from_slice(frame);
            let combined = std::mem::take(&mut self.field_assembly.buffer);
            self.field_assembly.active = false;
            return vec![Frame {
                data: combined,
                frame_type,
                pts,
                dts,
            }];
        }

        vec![Frame {
            data: frame.to_vec(),
            frame_type,
            pts,
            dts,
        }]
    }
}
