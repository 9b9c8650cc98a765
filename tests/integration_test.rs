//! End-to-end scenarios for the live-streaming core: feeding a synthetic
//! TS stream through `LivePipeline` and reading back the framed wire
//! messages a client session would forward over the socket.

use std::sync::Arc;

use robotv_live::config::Config;
use robotv_live::channel_cache::ChannelMetadataCache;
use robotv_live::pipeline::{DeviceAcquirer, LivePipeline, SwitchChannelError};
use robotv_live::ts::TS_PACKET_SIZE;
use robotv_live::wire::{self, FrameHeader, HEADER_LEN};

struct AlwaysGrant;
impl DeviceAcquirer for AlwaysGrant {
    fn acquire_live(&self, _channel_uid: u32) -> Result<(), SwitchChannelError> {
        Ok(())
    }
}

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        timeshift_dir: dir.to_path_buf(),
        max_timeshift_size: 256 * 1024,
        ..Config::default()
    }
}

fn crc32_mpeg2(data: &[u8]) -> u32 {
    const POLY: u32 = 0x04C1_1DB7;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
        }
    }
    crc
}

fn with_crc(mut section: Vec<u8>) -> Vec<u8> {
    let crc = crc32_mpeg2(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

fn pat_section(version: u8, program_number: u16, pmt_pid: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&program_number.to_be_bytes());
    body.push(0xE0 | ((pmt_pid >> 8) as u8));
    body.push(pmt_pid as u8);

    let section_length = 5 + body.len() + 4;
    let mut section = vec![
        0x00,
        0xB0 | ((section_length >> 8) as u8),
        section_length as u8,
        0x00,
        0x01,
        0xC1 | (version << 1),
        0x00,
        0x00,
    ];
    section.extend_from_slice(&body);
    with_crc(section)
}

/// PMT declaring one DVB subtitle elementary stream, via the subtitling
/// descriptor (tag 0x59) that gives it nonzero composition/ancillary page
/// ids, which is what this crate's stream-type mapping keys on for stream
/// type 0x06.
fn pmt_section(version: u8, program_number: u16, pcr_pid: u16, stream_pid: u16) -> Vec<u8> {
    let descriptor = [0x59u8, 0x05, 0x65, 0x6E, 0x67, 0x00, 0x01]; // lang "eng" + page ids
    let mut stream_entry = vec![
        0x06, // private/subtitle stream_type
        0xE0 | ((stream_pid >> 8) as u8),
        stream_pid as u8,
        0xF0 | ((descriptor.len() as u8 >> 8) & 0x0F),
        descriptor.len() as u8,
    ];
    stream_entry.extend_from_slice(&descriptor);

    let mut body = vec![
        0xE0 | ((pcr_pid >> 8) as u8),
        pcr_pid as u8,
        0xF0,
        0x00, // program_info_length = 0
    ];
    body.extend_from_slice(&stream_entry);

    let section_length = 5 + body.len() + 4;
    let mut section = vec![
        0x02,
        0xB0 | ((section_length >> 8) as u8),
        section_length as u8,
        (program_number >> 8) as u8,
        program_number as u8,
        0xC1 | (version << 1),
        0x00,
        0x00,
    ];
    section.extend_from_slice(&body);
    with_crc(section)
}

fn psi_packet(pid: u16, section: &[u8], continuity_counter: u8) -> Vec<u8> {
    let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
    packet[0] = 0x47;
    packet[1] = 0x40 | ((pid >> 8) as u8 & 0x1F); // PUSI set
    packet[2] = pid as u8;
    packet[3] = 0x10 | (continuity_counter & 0x0F);
    packet[4] = 0x00; // pointer_field
    let n = section.len().min(TS_PACKET_SIZE - 5);
    packet[5..5 + n].copy_from_slice(&section[..n]);
    packet
}

fn pes_packet(pid: u16, pusi: bool, payload: &[u8], continuity_counter: u8) -> Vec<u8> {
    let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
    packet[0] = 0x47;
    packet[1] = (if pusi { 0x40 } else { 0x00 }) | ((pid >> 8) as u8 & 0x1F);
    packet[2] = pid as u8;
    packet[3] = 0x10 | (continuity_counter & 0x0F);
    let n = payload.len().min(TS_PACKET_SIZE - 4);
    packet[4..4 + n].copy_from_slice(&payload[..n]);
    packet
}

/// One PES packet with a PTS-only header wrapping `data`.
fn pes_payload_with_pts(data: &[u8], pts_90k: i64) -> Vec<u8> {
    let mut pes = vec![0x00, 0x00, 0x01, 0xBD, 0x00, 0x00, 0x80, 0x80, 0x05];
    let mut pts_bytes = [0u8; 5];
    pts_bytes[0] = 0x21 | (((pts_90k >> 29) & 0x0E) as u8);
    pts_bytes[1] = ((pts_90k >> 22) & 0xFF) as u8;
    pts_bytes[2] = (((pts_90k >> 14) & 0xFE) as u8) | 0x01;
    pts_bytes[3] = ((pts_90k >> 7) & 0xFF) as u8;
    pts_bytes[4] = (((pts_90k << 1) & 0xFE) as u8) | 0x01;
    pes.extend_from_slice(&pts_bytes);
    pes.extend_from_slice(data);
    pes
}

fn pid_extract_muxpkts(wrapper: &[u8]) -> Vec<(u16, u16)> {
    // (innerMsgId, innerChannel) pairs, skipping the s64+s64 wrapper prefix.
    let mut out = Vec::new();
    let mut cursor = &wrapper[16..];
    while cursor.len() >= 8 {
        let msg_id = u16::from_be_bytes([cursor[0], cursor[1]]);
        let channel = u16::from_be_bytes([cursor[2], cursor[3]]);
        let len = u32::from_be_bytes([cursor[4], cursor[5], cursor[6], cursor[7]]) as usize;
        out.push((msg_id, channel));
        cursor = &cursor[8 + len..];
    }
    out
}

#[test]
fn clean_start_with_one_subtitle_stream_yields_stream_change_then_muxpkt() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = LivePipeline::new(&test_config(dir.path()), 1, wire::packet::CHANNEL_STREAM, 7, "eng").unwrap();
    let cache = Arc::new(ChannelMetadataCache::new());
    pipeline.switch_channel(100, &AlwaysGrant, cache.clone()).unwrap();

    pipeline.feed_ts_packet(&psi_packet(0x0000, &pat_section(0, 1, 0x1000), 0));
    pipeline.feed_ts_packet(&psi_packet(0x1000, &pmt_section(0, 1, 0x101, 0x101), 0));

    let pes = pes_payload_with_pts(b"hello-subtitle", 0);
    pipeline.feed_ts_packet(&pes_packet(0x101, true, &pes, 0));
    // a second PUSI packet forces the first PES to flush through the parser
    pipeline.feed_ts_packet(&pes_packet(0x101, true, &pes_payload_with_pts(b"next", 0), 1));

    pipeline.drain_writer_queue().unwrap();

    // Below the 128 KiB flush threshold and not paused: the batch stays
    // pending rather than flushing immediately.
    assert!(pipeline.request_packet().is_none());

    // Pausing forces whatever accumulated (across this and the prior call)
    // to flush.
    pipeline.pause(true);
    let wrapper = pipeline.request_packet().expect("pause forces a flush of the pending batch");
    let messages = pid_extract_muxpkts(&wrapper);

    assert_eq!(messages[0], (wire::stream_msg::CHANGE, wire::packet::CHANNEL_STREAM));
    assert_eq!(messages[1], (wire::stream_msg::MUXPKT, wire::packet::CHANNEL_STREAM));

    pipeline.close().unwrap();
}

#[test]
fn pending_batch_persists_across_calls_until_a_pause_flushes_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = LivePipeline::new(&test_config(dir.path()), 2, wire::packet::CHANNEL_STREAM, 7, "eng").unwrap();
    let cache = Arc::new(ChannelMetadataCache::new());
    pipeline.switch_channel(100, &AlwaysGrant, cache.clone()).unwrap();

    pipeline.feed_ts_packet(&psi_packet(0x0000, &pat_section(0, 1, 0x1000), 0));
    pipeline.feed_ts_packet(&psi_packet(0x1000, &pmt_section(0, 1, 0x101, 0x101), 0));
    pipeline.feed_ts_packet(&pes_packet(0x101, true, &pes_payload_with_pts(b"first", 0), 0));
    pipeline.feed_ts_packet(&pes_packet(0x101, true, &pes_payload_with_pts(b"second", 0), 1));
    pipeline.drain_writer_queue().unwrap();

    // Not paused and under threshold: caches into the pending batch, no
    // wire traffic yet.
    assert!(pipeline.request_packet().is_none());
    // Nothing new queued since; still nothing to flush on its own.
    assert!(pipeline.request_packet().is_none());

    pipeline.pause(true);
    let flushed = pipeline.request_packet().expect("pause flushes the batch accumulated across prior calls");
    let messages = pid_extract_muxpkts(&flushed);
    assert!(!messages.is_empty());

    pipeline.close().unwrap();
}

#[test]
fn switch_channel_propagates_device_acquisition_failure() {
    struct AlwaysBusy;
    impl DeviceAcquirer for AlwaysBusy {
        fn acquire_live(&self, _channel_uid: u32) -> Result<(), SwitchChannelError> {
            Err(SwitchChannelError::RecordingRunning)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = LivePipeline::new(&test_config(dir.path()), 3, wire::packet::CHANNEL_STREAM, 7, "eng").unwrap();
    let cache = Arc::new(ChannelMetadataCache::new());
    let err = pipeline.switch_channel(100, &AlwaysBusy, cache.clone()).unwrap_err();
    assert_eq!(err, SwitchChannelError::RecordingRunning);
}

#[test]
fn frame_header_round_trips_through_the_wire_format_used_by_the_pipeline() {
    let header_bytes: [u8; HEADER_LEN] = {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&wire::stream_msg::MUXPKT.to_be_bytes());
        buf[2..4].copy_from_slice(&wire::packet::CHANNEL_STREAM.to_be_bytes());
        buf[4..8].copy_from_slice(&7u32.to_be_bytes());
        buf[8..10].copy_from_slice(&wire::PROTOCOL_VERSION.to_be_bytes());
        buf[10..14].copy_from_slice(&0u32.to_be_bytes());
        buf
    };
    let header = FrameHeader::parse(&header_bytes).unwrap();
    assert_eq!(header.msg_id, wire::stream_msg::MUXPKT);
    assert_eq!(header.channel, wire::packet::CHANNEL_STREAM);
    assert_eq!(header.uid, 7);
}
