#![deny(rustdoc::missing_crate_level_docs)]

//! # robotv-live
//!
//! Live-streaming core of a television head-end: ingests MPEG Transport
//! Stream packets from a capture device, demultiplexes them into per-PID
//! elementary streams, extracts per-codec decoder metadata, packages
//! access units into a framed TCP protocol, and serves them to remote
//! clients with an on-disk timeshift ring buffer supporting live pause and
//! seek.
//!
//! ## Module overview
//!
//! - [`bits`] — MSB-first bitstream cursor used by every header parser.
//! - [`ring`] — single-producer/single-consumer byte ring with a
//!   contiguous-read margin, owned by composition rather than inherited.
//! - [`stream_info`] — `StreamInfo`/`StreamBundle`, the PID-keyed
//!   descriptor model shared across the demuxer and the wire protocol.
//! - [`parsers`] — one [`parsers::CodecParser`] per elementary-stream
//!   codec (H.264, H.265, MPEG-2 video, MPEG audio, AAC ADTS/LATM,
//!   AC-3/E-AC-3, DVB subtitle), dispatched through the `Parser` enum.
//! - [`ts`] — PAT/PMT parsing, per-PID PES reassembly, and the
//!   `DemuxerBundle` that tracks one program's full stream set.
//! - [`stream_packet_processor`] — drives TS packets through PAT/PMT
//!   tracking and the demuxer bundle, emitting framed `STREAM_CHANGE` and
//!   `STREAM_MUXPKT` messages.
//! - [`timeshift`] — file-backed ring buffer with a keyframe index for
//!   wall-clock seeking.
//! - [`channel_cache`] — in-memory last-seen-`StreamBundle` cache, keyed
//!   by channel UID, used to seed demuxers before a fresh PMT arrives.
//! - [`pipeline`] — `LivePipeline`, the per-client glue between one
//!   channel's TS feed and its outbound message stream.
//! - [`session`] — `ClientSession`, one TCP connection's request/response
//!   framing and dispatch.
//! - [`server`] — `ListenerLoop`, the TCP accept loop.
//! - [`wire`] — the binary framing shared by every request and response.
//! - [`config`] — explicit, non-global configuration.
//! - [`error`] — the crate's unified `RoboTvError` type.

/// MSB-first bit cursor over a byte buffer.
pub mod bits;

/// Per-channel stream-bundle cache seeding demuxers ahead of a fresh PMT.
pub mod channel_cache;

/// Explicit, non-global configuration.
pub mod config;

/// Unified error type and `Result` alias.
pub mod error;

/// Per-codec elementary stream parsers.
pub mod parsers;

/// Per-client live streaming glue: TS feed in, outbound messages out.
pub mod pipeline;

/// Single-producer/single-consumer byte ring used by element parsers.
pub mod ring;

/// TCP accept loop and allow-list enforcement.
pub mod server;

/// One TCP client connection's request/response framing and dispatch.
pub mod session;

/// Per-elementary-stream descriptor and PID-keyed bundle.
pub mod stream_info;

/// Feeds TS packets through PAT/PMT tracking and per-PID demuxing.
pub mod stream_packet_processor;

/// File-backed timeshift ring buffer with wall-clock-seekable keyframes.
pub mod timeshift;

/// MPEG Transport Stream demultiplexing.
pub mod ts;

/// Binary wire framing for the TCP delivery protocol.
pub mod wire;

pub use error::{Result, RoboTvError};
