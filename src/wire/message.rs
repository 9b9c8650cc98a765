use std::io::Read;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;

use super::HEADER_LEN;
use crate::error::{Result, RoboTvError};

/// Set on the payload's leading flag byte when the remaining bytes are
/// zlib-deflated.
const FLAG_COMPRESSED: u8 = 0x01;

/// Incremental builder for one outbound frame.
///
/// Call `put_*` in wire order, then `finish()` to prepend the header and
/// produce the bytes ready to write to the socket.
pub struct OutboundMessage {
    msg_id: u16,
    channel: u16,
    uid: u32,
    body: BytesMut,
}

impl OutboundMessage {
    pub fn new(msg_id: u16, channel: u16, uid: u32) -> Self {
        OutboundMessage {
            msg_id,
            channel,
            uid,
            body: BytesMut::new(),
        }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.body.put_u8(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.body.put_u16(value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.body.put_u32(value);
        self
    }

    pub fn put_i64(&mut self, value: i64) -> &mut Self {
        self.body.put_i64(value);
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.body.put_u64(value);
        self
    }

    /// Writes `data` as-is, with no length prefix.
    pub fn put_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.body.extend_from_slice(data);
        self
    }

    /// Writes a length-prefixed blob: `u8 length` followed by up to 255
    /// bytes. Used for the SPS/PPS/VPS decoder-data fields.
    pub fn put_blob_u8(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len().min(u8::MAX as usize);
        self.body.put_u8(len as u8);
        self.body.extend_from_slice(&data[..len]);
        self
    }

    /// Writes `s` followed by a NUL terminator.
    pub fn put_string(&mut self, s: &str) -> &mut Self {
        self.body.extend_from_slice(s.as_bytes());
        self.body.put_u8(0);
        self
    }

    /// Prepends the leading compression flag byte and the 14-byte frame
    /// header, and returns the complete frame. This crate never compresses
    /// an outbound body, so the flag byte is always 0; the decode side
    /// still honors it for protocol compatibility with compressing peers.
    pub fn finish(self) -> Bytes {
        let payload_len = 1 + self.body.len();
        let mut frame = BytesMut::with_capacity(HEADER_LEN + payload_len);
        frame.put_u16(self.msg_id);
        frame.put_u16(self.channel);
        frame.put_u32(self.uid);
        frame.put_u16(super::PROTOCOL_VERSION);
        frame.put_u32(payload_len as u32);
        frame.put_u8(0); // compression flag
        frame.extend_from_slice(&self.body);
        frame.freeze()
    }
}

/// Decoded fixed header of an inbound or outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_id: u16,
    pub channel: u16,
    pub uid: u32,
    pub protocol_version: u16,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Parses the fixed header from exactly `HEADER_LEN` bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(RoboTvError::Protocol(format!(
                "frame header needs {HEADER_LEN} bytes, got {}",
                data.len()
            )));
        }

        let mut cursor = data;
        Ok(FrameHeader {
            msg_id: cursor.get_u16(),
            channel: cursor.get_u16(),
            uid: cursor.get_u32(),
            protocol_version: cursor.get_u16(),
            payload_len: cursor.get_u32(),
        })
    }
}

/// Strips the leading compression flag byte from a raw frame payload,
/// inflating the remainder with zlib if the flag indicates compression.
/// Call before building an [`InboundPayload`] over the result.
pub fn decode_payload(data: &[u8]) -> Result<Bytes> {
    let Some((&flag, body)) = data.split_first() else {
        return Err(RoboTvError::Protocol("empty payload, missing compression flag".into()));
    };

    if flag & FLAG_COMPRESSED != 0 {
        let mut inflated = Vec::new();
        ZlibDecoder::new(body)
            .read_to_end(&mut inflated)
            .map_err(|err| RoboTvError::Protocol(format!("zlib inflate failed: {err}")))?;
        Ok(Bytes::from(inflated))
    } else {
        Ok(Bytes::copy_from_slice(body))
    }
}

/// Cursor over an inbound frame's payload, matching `OutboundMessage`'s
/// encoding conventions on the way back in. Expects the leading compression
/// flag byte to already have been stripped by [`decode_payload`].
pub struct InboundPayload<'a> {
    cursor: &'a [u8],
}

impl<'a> InboundPayload<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        InboundPayload { cursor: data }
    }

    pub fn remaining(&self) -> usize {
        self.cursor.len()
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        if self.cursor.is_empty() {
            return Err(RoboTvError::Protocol("unexpected end of payload".into()));
        }
        Ok(self.cursor.get_u8())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        if self.cursor.len() < 4 {
            return Err(RoboTvError::Protocol("unexpected end of payload".into()));
        }
        Ok(self.cursor.get_u32())
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        if self.cursor.len() < 8 {
            return Err(RoboTvError::Protocol("unexpected end of payload".into()));
        }
        Ok(self.cursor.get_i64())
    }

    /// Reads a NUL-terminated UTF-8 string.
    pub fn get_string(&mut self) -> Result<String> {
        let end = self
            .cursor
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| RoboTvError::Protocol("unterminated string in payload".into()))?;
        let s = String::from_utf8_lossy(&self.cursor[..end]).into_owned();
        self.cursor.advance(end + 1);
        Ok(s)
    }
}
