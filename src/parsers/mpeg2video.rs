//! MPEG-2 video elementary stream parser.
//!
//! A single PES payload can carry a sequence header plus several pictures;
//! each picture start code splits off its own [`Frame`], with PTS/DTS
//! extrapolated forward by the sequence's frame duration between them.

use super::{CodecParser, Frame};
use crate::stream_info::FrameType;
use crate::stream_info::StreamInfo;

const SEQUENCE_START: [u8; 4] = [0x00, 0x00, 0x01, 0xB3];
const PICTURE_START: [u8; 4] = [0x00, 0x00, 0x01, 0x00];

/// frame duration in 90kHz ticks, indexed by the 4-bit frame-rate code.
const FRAME_DURATIONS: [u32; 16] = [
    0, 3753, 3750, 3600, 3003, 3000, 1800, 1501, 1500, 0, 0, 0, 0, 0, 0, 0,
];
/// (rate, scale) indexed by the 4-bit frame-rate code.
const FRAME_RATES: [(u32, u32); 16] = [
    (0, 0),
    (24000, 1001),
    (24, 1),
    (25, 1),
    (30000, 1001),
    (30, 1),
    (50, 1),
    (60000, 1001),
    (60, 1),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
];
/// display aspect ratio, indexed by the 4-bit aspect-ratio code.
const ASPECT_RATIOS: [f64; 16] = [
    0.0, 1.0, 1.333333333, 1.777777778, 2.21, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

pub struct Mpeg2VideoParser {
    duration: u32,
    current_pts: Option<i64>,
    current_dts: Option<i64>,
}

impl Mpeg2VideoParser {
    pub fn new() -> Self {
        Mpeg2VideoParser {
            duration: 0,
            current_pts: None,
            current_dts: None,
        }
    }

    fn parse_sequence_header(&mut self, payload: &[u8], info: &mut StreamInfo) {
        if payload.len() < 8 {
            return;
        }
        let width = (((payload[4] as u16) << 4) | (payload[5] as u16 >> 4)) as u16;
        let height = ((((payload[5] as u16) & 0x0F) << 8) | payload[6] as u16) as u16;
        let aspect_idx = (payload[7] >> 4) as usize;
        let rate_idx = (payload[7] & 0x0F) as usize;

        let aspect = (ASPECT_RATIOS[aspect_idx] * 10000.0) as i64;
        let (fps_rate, fps_scale) = FRAME_RATES[rate_idx];
        self.duration = FRAME_DURATIONS[rate_idx];

        if width >= 320 && height >= 240 {
            if info.video.width != width
                || info.video.height != height
                || info.video.aspect != aspect
                || info.video.fps_rate != fps_rate
                || info.video.fps_scale != fps_scale
            {
                info.video.width = width;
                info.video.height = height;
                info.video.aspect = aspect;
                info.video.fps_rate = fps_rate;
                info.video.fps_scale = fps_scale;
            }
            info.parsed = true;
        }
    }

    fn frame_type(payload: &[u8]) -> FrameType {
        if payload.len() < 6 {
            return FrameType::Unknown;
        }
        // picture_coding_type is 3 bits starting after a 10-bit temporal
        // reference field, itself right after the 4-byte start code.
        let bits = ((payload[4] as u32) << 8) | payload[5] as u32;
        let coding_type = (bits >> 3) & 0x7;
        match coding_type {
            1 => FrameType::I,
            2 => FrameType::P,
            3 => FrameType::B,
            4 => FrameType::D,
            _ => FrameType::Unknown,
        }
    }
}

impl CodecParser for Mpeg2VideoParser {
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
        self.current_pts = pts;
        self.current_dts = dts;

        let mut out = Vec::new();
        let mut cursor = 0usize;

        if let Some(pos) = find_code(frame, &SEQUENCE_START, 0) {
            self.parse_sequence_header(&frame[pos..], info);
            cursor = pos + 4;
        }

        loop {
            let Some(pic_start) = find_code(frame, &PICTURE_START, cursor) else {
                break;
            };
            let next = find_code(frame, &PICTURE_START, pic_start + 4)
                .or_else(|| find_code(frame, &SEQUENCE_START, pic_start + 4))
                .unwrap_or(frame.len());

            let slice = &frame[pic_start..next];
            let frame_type = Self::frame_type(slice);

            out.push(Frame {
                data: slice.to_vec(),
                frame_type,
                pts: self.current_pts,
                dts: self.current_dts,
            });

            if self.duration > 0 {
                self.current_pts = self.current_pts.map(|v| v + self.duration as i64);
                self.current_dts = self.current_dts.map(|v| v + self.duration as i64);
            }

            cursor = next;
        }

        out
    }
}

fn find_code(data: &[u8], code: &[u8; 4], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(4)
        .position(|w| w == code)
        .map(|pos| pos + from)
}
