//! File-backed timeshift ring buffer.
//!
//! One `TimeshiftRing` per connected client session. Writes land on a
//! bounded writer queue so the demux path never blocks on disk; a periodic
//! drain (driven by the owning pipeline, not a dedicated OS thread — this
//! crate's concurrency substrate is tokio, not raw threads) pops the queue
//! FIFO and appends each packet to the backing file.

mod keyframe_index;

pub use keyframe_index::{KeyframeEntry, KeyframeIndex};

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::{Result, RoboTvError};
use crate::stream_info::{Content, FrameType};

const WRITER_QUEUE_LIMIT: usize = 400;
const SYNC_INTERVAL: Duration = Duration::from_millis(2000);
/// Slack appended to the configured buffer size so an in-flight record can
/// spill past the logical capacity before the writer wraps.
const FILE_SLACK: u64 = 1024 * 1024;
const STALE_FILE_PREFIX: &str = "robotv-ringbuffer-";

/// One packet accepted onto the writer queue, not yet on disk.
pub struct QueuedPacket {
    pub data: Vec<u8>,
    pub content: Content,
    pub frame_type: FrameType,
    pub pts: i64,
}

/// File-backed circular packet buffer with a wall-clock-seekable keyframe
/// index.
pub struct TimeshiftRing {
    path: PathBuf,
    write_file: File,
    read_file: File,
    capacity: u64,
    write_pos: u64,
    read_pos: u64,
    /// Toggled whenever either the read or the write cursor wraps past
    /// `capacity`; used to tell "reader caught up with writer" apart from
    /// "reader is a lap behind".
    wrapped: bool,
    /// Sticky once the writer has wrapped at least once; gates keyframe
    /// index trimming.
    has_wrapped: bool,
    wrap_count: u64,
    paused: bool,
    index: KeyframeIndex,
    queue_start_time_ms: i64,
    last_sync: Instant,
    writer_queue: VecDeque<QueuedPacket>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn ring_file_name(session_id: u32) -> String {
    format!("{STALE_FILE_PREFIX}{session_id:05}.data")
}

impl TimeshiftRing {
    /// Creates (or truncates) the backing file for `session_id` under
    /// `config.timeshift_dir` and opens independent read/write handles to
    /// it.
    pub fn new(config: &Config, session_id: u32) -> Result<Self> {
        std::fs::create_dir_all(&config.timeshift_dir)?;
        let path = config.timeshift_dir.join(ring_file_name(session_id));
        let capacity = config.max_timeshift_size;

        let write_file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        write_file.set_len(capacity + FILE_SLACK)?;

        let mut read_file = OpenOptions::new().read(true).open(&path)?;
        read_file.seek(SeekFrom::Start(0))?;

        Ok(TimeshiftRing {
            path,
            write_file,
            read_file,
            capacity,
            write_pos: 0,
            read_pos: 0,
            wrapped: false,
            has_wrapped: false,
            wrap_count: 0,
            paused: false,
            index: KeyframeIndex::new(),
            queue_start_time_ms: now_ms(),
            last_sync: Instant::now(),
            writer_queue: VecDeque::new(),
        })
    }

    /// Removes any ring files left behind by a prior, uncleanly terminated
    /// run.
    pub fn cleanup_stale_files(dir: &Path) -> Result<()> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Ok(());
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with(STALE_FILE_PREFIX) {
                let _ = std::fs::remove_file(entry.path());
            }
        }
        Ok(())
    }

    /// Enqueues a packet for the next drain. Drops the newest packet and
    /// logs when the writer queue is already at capacity.
    pub fn queue(&mut self, packet: QueuedPacket) {
        if self.writer_queue.len() >= WRITER_QUEUE_LIMIT {
            log::warn!("timeshift writer queue full ({WRITER_QUEUE_LIMIT}), dropping packet");
            return;
        }
        self.writer_queue.push_back(packet);
    }

    /// Drains the writer queue, appending each packet to the backing file
    /// in FIFO order. A single packet's I/O failure is logged and the
    /// packet dropped; draining continues with the next one.
    pub fn drain_pending(&mut self) -> Result<()> {
        while let Some(packet) = self.writer_queue.pop_front() {
            if let Err(err) = self.write_one(packet) {
                log::error!("timeshift ring write failed, dropping packet: {err}");
            }
        }
        Ok(())
    }

    fn write_one(&mut self, packet: QueuedPacket) -> Result<()> {
        if self.index.is_empty() {
            self.queue_start_time_ms = now_ms();
        }

        let mut record = Vec::with_capacity(4 + packet.data.len());
        record.extend_from_slice(&(packet.data.len() as u32).to_be_bytes());
        record.extend_from_slice(&packet.data);
        let record_len = record.len() as u64;

        if self.write_pos >= self.capacity {
            self.write_pos = 0;
            self.wrapped = !self.wrapped;
            self.has_wrapped = true;
            self.wrap_count += 1;
        }

        let packet_end = self.write_pos + record_len;

        while packet_end >= self.read_pos && self.wrapped {
            if self.internal_read()?.is_none() {
                return Err(RoboTvError::RingOverrun(
                    "writer could not force the reader forward to make room".into(),
                ));
            }
        }

        self.index.trim(packet_end, self.wrap_count, self.has_wrapped);
        if let Some(front) = self.index.front() {
            self.queue_start_time_ms = front.wallclock_time_ms;
        }

        if packet.frame_type == FrameType::I && packet.content == Content::Video {
            self.index.push(KeyframeEntry {
                file_position: self.write_pos,
                wallclock_time_ms: now_ms(),
                pts: packet.pts,
                wrap_count: self.wrap_count,
            });
        }

        self.write_file.seek(SeekFrom::Start(self.write_pos))?;
        self.write_file.write_all(&record)?;
        self.write_pos += record_len;

        if self.last_sync.elapsed() >= SYNC_INTERVAL {
            self.write_file.sync_data()?;
            self.last_sync = Instant::now();
        }

        Ok(())
    }

    fn internal_read(&mut self) -> Result<Option<Vec<u8>>> {
        if self.read_pos >= self.capacity {
            self.read_pos = 0;
            self.wrapped = !self.wrapped;
        }
        if self.read_pos >= self.write_pos && !self.wrapped {
            return Ok(None);
        }

        self.read_file.seek(SeekFrom::Start(self.read_pos))?;
        let mut len_buf = [0u8; 4];
        self.read_file.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut data = vec![0u8; len];
        self.read_file.read_exact(&mut data)?;
        self.read_pos += 4 + len as u64;
        Ok(Some(data))
    }

    /// Reads the next available packet, or `None` if paused or caught up
    /// with the writer.
    pub fn read(&mut self) -> Result<Option<Vec<u8>>> {
        if self.paused {
            return Ok(None);
        }
        self.internal_read()
    }

    /// Toggles the paused flag. Returns `false` (a no-op) if the ring was
    /// already in the requested state.
    pub fn pause(&mut self, on: bool) -> bool {
        if self.paused == on {
            return false;
        }
        self.paused = on;
        true
    }

    /// Seeks the read cursor to the keyframe nearest `wallclock_position_ms`,
    /// returning the PTS to resume playback from.
    pub fn seek(&mut self, wallclock_position_ms: i64) -> Option<i64> {
        let (position, pts, entry_wrap_count) = self.index.seek(wallclock_position_ms)?;
        self.read_pos = position;
        self.wrapped = entry_wrap_count != self.wrap_count;
        Some(pts)
    }

    pub fn timeshift_start_position(&self) -> i64 {
        self.queue_start_time_ms
    }

    /// Closes both file handles and removes the backing file.
    pub fn close(self) -> Result<()> {
        let path = self.path.clone();
        drop(self.write_file);
        drop(self.read_file);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
