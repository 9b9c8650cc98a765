//! Per-PID demuxer: PES reassembly driving one elementary-stream [`Parser`].

use super::TsHeader;
use crate::parsers::{Frame, Parser};
use crate::stream_info::StreamInfo;

/// 90kHz clock rescaled to microseconds, matching the rest of the pipeline's
/// timestamp unit.
fn rescale(pts_90k: i64) -> i64 {
    pts_90k * 1_000_000 / 90_000
}

fn parse_pts_dts(header: &[u8]) -> (Option<i64>, Option<i64>, usize) {
    if header.len() < 9 || header[0] != 0x00 || header[1] != 0x00 || header[2] != 0x01 {
        return (None, None, 0);
    }
    let pts_dts_flags = header[7] >> 6;
    let header_data_length = header[8] as usize;
    let fixed_len = 9 + header_data_length;

    if pts_dts_flags == 0 || header.len() < 14 {
        return (None, None, fixed_len);
    }

    let pts = read_timestamp(&header[9..14]);

    let dts = if pts_dts_flags == 0b11 && header.len() >= 19 {
        Some(read_timestamp(&header[14..19]))
    } else {
        None
    };

    (Some(pts), dts, fixed_len)
}

fn read_timestamp(bytes: &[u8]) -> i64 {
    ((bytes[0] as i64 & 0x0E) << 29)
        | ((bytes[1] as i64) << 22)
        | ((bytes[2] as i64 & 0xFE) << 14)
        | ((bytes[3] as i64) << 7)
        | ((bytes[4] as i64 & 0xFE) >> 1)
}

/// Demultiplexes one PID: reassembles PES packets from TS payload fragments
/// and drives the codec-specific [`Parser`] over each one.
pub struct PidDemuxer {
    pub info: StreamInfo,
    parser: Option<Parser>,
    pes_buffer: Vec<u8>,
}

impl PidDemuxer {
    pub fn new(info: StreamInfo) -> Self {
        let parser = Parser::for_stream_type(info.stream_type);
        PidDemuxer {
            info,
            parser,
            pes_buffer: Vec::new(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.info.parsed
    }

    /// Feeds one TS packet's worth of data for this PID, returning any
    /// frames completed as a result (usually 0 or 1).
    pub fn process_ts_packet(&mut self, header: &TsHeader, packet: &[u8]) -> Vec<Frame> {
        if header.transport_error || header.scrambling_control != 0 || !header.contains_payload {
            return Vec::new();
        }

        let offset = header.payload_offset(packet);
        if offset >= packet.len() {
            return Vec::new();
        }
        let payload = &packet[offset..];

        if header.payload_unit_start {
            let completed = self.flush_pes_buffer();
            self.pes_buffer.extend_from_slice(payload);
            return completed;
        }

        if self.pes_buffer.is_empty() {
            // PUSI required before any payload is meaningful; discard stray fragments.
            return Vec::new();
        }
        self.pes_buffer.extend_from_slice(payload);
        Vec::new()
    }

    /// Processes any buffered PES packet immediately, e.g. on stream
    /// teardown, without waiting for the next PUSI boundary.
    pub fn flush(&mut self) -> Vec<Frame> {
        self.flush_pes_buffer()
    }

    fn flush_pes_buffer(&mut self) -> Vec<Frame> {
        if self.pes_buffer.is_empty() {
            return Vec::new();
        }
        let pes = std::mem::take(&mut self.pes_buffer);

        let (pts_90k, dts_90k, header_len) = parse_pts_dts(&pes);
        if header_len == 0 || header_len > pes.len() {
            return Vec::new();
        }
        let payload = &pes[header_len..];
        let pts = pts_90k.map(rescale);
        let dts = dts_90k.map(rescale).or(pts);

        let Some(parser) = self.parser.as_mut() else {
            return Vec::new();
        };

        parser.put_data(payload);
        let mut frames = Vec::new();
        parser.parse(&mut self.info, pts, dts, &mut frames);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_info::StreamType;
    use crate::ts::TS_PACKET_SIZE;

    fn make_packet(pid: u16, pusi: bool, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
        packet[0] = 0x47;
        packet[1] = if pusi { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
        packet[2] = pid as u8;
        packet[3] = 0x10;
        let n = payload.len().min(TS_PACKET_SIZE - 4);
        packet[4..4 + n].copy_from_slice(&payload[..n]);
        packet
    }

    #[test]
    fn extracts_pts_from_pes_header_and_feeds_parser() {
        let info = StreamInfo::new(0x101, StreamType::DvbSub, "");
        let mut demuxer = PidDemuxer::new(info);

        // minimal PES header with PTS-only flag, then an arbitrary payload
        let mut pes = vec![0x00, 0x00, 0x01, 0xBD, 0x00, 0x00, 0x80, 0x80, 0x05];
        pes.extend_from_slice(&[0x21, 0x00, 0x01, 0x00, 0x01]); // PTS = 0
        pes.extend_from_slice(b"subtitle-data");

        let packet = make_packet(0x101, true, &pes);
        let header = TsHeader::parse(&packet).unwrap();
        let frames = demuxer.process_ts_packet(&header, &packet);
        assert!(frames.is_empty()); // first PUSI just opens the buffer

        // a second PUSI packet flushes the first PES
        let packet2 = make_packet(0x101, true, &[0x00, 0x00, 0x01, 0xBD, 0x00, 0x00, 0x80, 0x00, 0x00]);
        let header2 = TsHeader::parse(&packet2).unwrap();
        let frames = demuxer.process_ts_packet(&header2, &packet2);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].data.starts_with(b"subtitle-data"));
    }
}
