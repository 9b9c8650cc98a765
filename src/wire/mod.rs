//! Wire framing for the TCP delivery protocol.
//!
//! Every message, request or response, shares one frame shape: a fixed
//! 14-byte header followed by a variable-length payload. All integers are
//! big-endian; strings are NUL-terminated UTF-8.

mod message;

pub use message::{decode_payload, FrameHeader, InboundPayload, OutboundMessage};

/// Protocol version carried in every frame header.
pub const PROTOCOL_VERSION: u16 = 7;

/// Packet (channel) types.
pub mod packet {
    pub const CHANNEL_REQUEST_RESPONSE: u16 = 1;
    pub const CHANNEL_STREAM: u16 = 2;
    pub const CHANNEL_STATUS: u16 = 5;
    pub const CHANNEL_SCAN: u16 = 6;
}

/// Stream-channel message ids (carried as `msgId` on `CHANNEL_STREAM` frames).
pub mod stream_msg {
    pub const CHANGE: u16 = 1;
    pub const STATUS: u16 = 2;
    pub const QUEUESTATUS: u16 = 3;
    pub const MUXPKT: u16 = 4;
    pub const SIGNALINFO: u16 = 5;
    pub const DETACH: u16 = 7;
}

/// Request opcodes (carried as `msgId` on `CHANNEL_REQUEST_RESPONSE` frames).
pub mod request {
    pub const LOGIN: u16 = 1;

    pub const CHANNELSTREAM_OPEN: u16 = 20;
    pub const CHANNELSTREAM_CLOSE: u16 = 21;
    pub const CHANNELSTREAM_REQUEST: u16 = 22;
    pub const CHANNELSTREAM_PAUSE: u16 = 23;
    pub const CHANNELSTREAM_SIGNAL: u16 = 24;
    /// Not present in the original protocol header; assigned here to give
    /// timeshift seeking a request id. See `SPEC_FULL.md` §9, Open
    /// Question 4.
    pub const CHANNELSTREAM_SEEK: u16 = 25;
}

/// Stream status codes carried in a `STATUS` stream message's payload.
pub mod stream_status {
    pub const SIGNAL_LOST: u32 = 111;
    pub const SIGNAL_RESTORED: u32 = 112;
}

/// Request/response return codes.
pub mod status {
    pub const OK: u32 = 0;
    pub const REC_RUNNING: u32 = 1;
    pub const ENCRYPTED: u32 = 994;
    pub const NOT_SUPPORTED: u32 = 995;
    pub const DATA_UNKNOWN: u32 = 996;
    pub const DATA_LOCKED: u32 = 997;
    pub const DATA_INVALID: u32 = 998;
    pub const ERROR: u32 = 999;
}

/// Length of the fixed frame header, in bytes:
/// `msgId(2) + channel(2) + uid(4) + protocolVersion(2) + payloadLen(4)`.
pub const HEADER_LEN: usize = 14;
