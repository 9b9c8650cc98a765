//! Timeshift ring buffer scenarios: wrap accounting, keyframe-seek
//! boundaries, and reader-overrun recovery, exercised purely through the
//! public `TimeshiftRing` surface (writer queue + drain, reader + seek).

use robotv_live::config::Config;
use robotv_live::stream_info::{Content, FrameType};
use robotv_live::timeshift::{QueuedPacket, TimeshiftRing};

fn test_config(dir: &std::path::Path, max_timeshift_size: u64) -> Config {
    Config {
        timeshift_dir: dir.to_path_buf(),
        max_timeshift_size,
        ..Config::default()
    }
}

fn keyframe(data: &[u8], pts: i64) -> QueuedPacket {
    QueuedPacket {
        data: data.to_vec(),
        content: Content::Video,
        frame_type: FrameType::I,
        pts,
    }
}

fn non_keyframe(data: &[u8]) -> QueuedPacket {
    QueuedPacket {
        data: data.to_vec(),
        content: Content::Video,
        frame_type: FrameType::P,
        pts: 0,
    }
}

#[test]
fn writer_wraps_and_reader_keeps_reading_in_order() {
    let dir = tempfile::tempdir().unwrap();
    // Small ring: each record is 4-byte length prefix + 64 bytes of payload,
    // so a handful of packets force multiple wraps.
    let mut ring = TimeshiftRing::new(&test_config(dir.path(), 256), 1).unwrap();

    let mut sent = Vec::new();
    for i in 0..20u8 {
        let payload = vec![i; 64];
        ring.queue(keyframe(&payload, i as i64));
        ring.drain_pending().unwrap();
        sent.push(payload);
    }

    let mut received = Vec::new();
    while let Some(packet) = ring.read().unwrap() {
        received.push(packet);
    }

    // The ring is bounded; older packets get overwritten by the writer
    // forcing the reader forward, but whatever the reader did see must be a
    // contiguous, in-order suffix of what was sent.
    assert!(!received.is_empty());
    let tail = &sent[sent.len() - received.len()..];
    assert_eq!(received, tail);
}

#[test]
fn reader_paused_during_writer_wrap_is_forced_forward_not_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let mut ring = TimeshiftRing::new(&test_config(dir.path(), 256), 2).unwrap();

    // Simulate a reader that's paused (never drains) while the writer keeps
    // producing well past the ring's capacity.
    for i in 0..30u8 {
        ring.queue(keyframe(&vec![i; 64], i as i64));
        // write_one forces the reader forward internally when the writer
        // catches up to it; this must never deadlock or error out up
        // through drain_pending, whose errors are logged and swallowed.
        ring.drain_pending().unwrap();
    }

    // The ring is still usable afterward: pausing and reading behaves.
    assert!(ring.pause(true));
    assert_eq!(ring.read().unwrap(), None);
    assert!(ring.pause(false));
}

#[test]
fn seek_before_earliest_keyframe_returns_earliest_pts() {
    let dir = tempfile::tempdir().unwrap();
    let mut ring = TimeshiftRing::new(&test_config(dir.path(), 64 * 1024), 3).unwrap();

    for pts in [100, 200, 300] {
        ring.queue(keyframe(b"kf", pts));
        ring.drain_pending().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    let pts = ring.seek(0).expect("seek before earliest entry must still resolve");
    assert_eq!(pts, 100);
}

#[test]
fn seek_after_latest_keyframe_returns_latest_pts() {
    let dir = tempfile::tempdir().unwrap();
    let mut ring = TimeshiftRing::new(&test_config(dir.path(), 64 * 1024), 4).unwrap();

    for pts in [100, 200, 300] {
        ring.queue(keyframe(b"kf", pts));
        ring.drain_pending().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    let pts = ring.seek(i64::MAX).expect("seek past latest entry must still resolve");
    assert_eq!(pts, 300);
}

#[test]
fn non_keyframes_never_become_seek_targets() {
    let dir = tempfile::tempdir().unwrap();
    let mut ring = TimeshiftRing::new(&test_config(dir.path(), 64 * 1024), 5).unwrap();

    ring.queue(keyframe(b"kf", 42));
    ring.drain_pending().unwrap();
    for _ in 0..5 {
        ring.queue(non_keyframe(b"pf"));
    }
    ring.drain_pending().unwrap();

    // No matter where we seek, the only keyframe in the index is pts 42.
    assert_eq!(ring.seek(0), Some(42));
    assert_eq!(ring.seek(i64::MAX), Some(42));
}

#[test]
fn timeshift_start_position_advances_once_the_oldest_keyframe_is_trimmed() {
    let dir = tempfile::tempdir().unwrap();
    // Small ring forces several wraps over 20 keyframes, which must trim the
    // index's front entries rather than let them pile up forever.
    let mut ring = TimeshiftRing::new(&test_config(dir.path(), 256), 7).unwrap();

    let initial_start = ring.timeshift_start_position();

    for i in 0..20u8 {
        ring.queue(keyframe(&vec![i; 64], i as i64));
        ring.drain_pending().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
    }

    let advanced_start = ring.timeshift_start_position();
    assert!(
        advanced_start > initial_start,
        "oldest keyframes were trimmed out of the ring, so the reported start must track the new front"
    );
}

#[test]
fn pause_then_resume_round_trips_without_losing_unread_packets() {
    let dir = tempfile::tempdir().unwrap();
    let mut ring = TimeshiftRing::new(&test_config(dir.path(), 64 * 1024), 6).unwrap();

    ring.queue(keyframe(b"a", 1));
    ring.drain_pending().unwrap();

    ring.pause(true);
    assert_eq!(ring.read().unwrap(), None);

    ring.pause(false);
    assert_eq!(ring.read().unwrap(), Some(b"a".to_vec()));
}
