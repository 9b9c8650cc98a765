//! One TCP client connection: request/response framing, LOGIN handshake,
//! and dispatch of the streaming-core subset of the protocol to a
//! [`LivePipeline`].

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::channel_cache::ChannelMetadataCache;
use crate::config::Config;
use crate::error::{Result, RoboTvError};
use crate::pipeline::{DeviceAcquirer, LivePipeline, SwitchChannelError};
use crate::wire::{self, request, status, FrameHeader, InboundPayload, OutboundMessage, HEADER_LEN};

/// Per-message write deadline; a client that can't drain its socket this
/// slowly is considered gone.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Idle-read timeout; used only for liveness bookkeeping, not as a
/// disconnect trigger.
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

const SUPPORTED_PROTOCOL_VERSIONS: [u16; 2] = [7, 8];

/// One accepted client connection.
pub struct ClientSession {
    stream: TcpStream,
    config: Config,
    cache: Arc<ChannelMetadataCache>,
    acquirer: Arc<dyn DeviceAcquirer + Send + Sync>,
    session_id: u32,
    pipeline: Option<LivePipeline>,
}

impl ClientSession {
    pub fn new(
        stream: TcpStream,
        config: Config,
        cache: Arc<ChannelMetadataCache>,
        acquirer: Arc<dyn DeviceAcquirer + Send + Sync>,
        session_id: u32,
    ) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(ClientSession {
            stream,
            config,
            cache,
            acquirer,
            session_id,
            pipeline: None,
        })
    }

    /// Reads and dispatches requests until the client disconnects or sends
    /// a malformed/unsupported LOGIN.
    pub async fn run(mut self) -> Result<()> {
        let Some((header, payload)) = self.read_frame().await? else {
            return Ok(());
        };

        let accepted = header.msg_id == request::LOGIN
            && wire::decode_payload(&payload)
                .map(|decoded| self.accepts_login(&decoded))
                .unwrap_or(false);
        if !accepted {
            log::warn!("session {}: rejected login, closing", self.session_id);
            return Ok(());
        }
        self.write_response(request::LOGIN, header.uid, status::OK, &[]).await?;

        loop {
            let Some((header, payload)) = self.read_frame().await? else {
                break;
            };

            if let Err(err) = self.dispatch(header, payload).await {
                log::error!("session {}: dispatch error: {err}", self.session_id);
                break;
            }
        }

        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.close();
        }
        Ok(())
    }

    fn accepts_login(&self, payload: &[u8]) -> bool {
        let mut cursor = InboundPayload::new(payload);
        match cursor.get_u32() {
            Ok(v) => SUPPORTED_PROTOCOL_VERSIONS.contains(&(v as u16)),
            Err(_) => false,
        }
    }

    async fn dispatch(&mut self, header: FrameHeader, payload: Bytes) -> Result<()> {
        let decoded = wire::decode_payload(&payload)?;
        let mut body = InboundPayload::new(&decoded);

        match header.msg_id {
            request::CHANNELSTREAM_OPEN => {
                let channel_uid = body.get_u32().unwrap_or(0);
                let code = self.open_channel(header.uid, channel_uid);
                self.write_response(header.msg_id, header.uid, code, &[]).await?;
            }
            request::CHANNELSTREAM_CLOSE => {
                if let Some(pipeline) = self.pipeline.take() {
                    let _ = pipeline.close();
                }
                self.write_response(header.msg_id, header.uid, status::OK, &[]).await?;
            }
            request::CHANNELSTREAM_REQUEST => {
                let payload = self
                    .pipeline
                    .as_mut()
                    .and_then(|p| p.request_packet())
                    .unwrap_or_default();
                self.write_response(header.msg_id, header.uid, status::OK, &payload).await?;
            }
            request::CHANNELSTREAM_PAUSE => {
                let on = body.get_u8().unwrap_or(0) != 0;
                if let Some(pipeline) = self.pipeline.as_mut() {
                    pipeline.pause(on);
                }
                self.write_response(header.msg_id, header.uid, status::OK, &[]).await?;
            }
            request::CHANNELSTREAM_SIGNAL => {
                // Signal readings arrive out-of-band from the capture
                // device (an external collaborator); absent a live
                // reading this reports an unlocked, zeroed status.
                let mut response = BytesMut::new();
                response.extend_from_slice(&[0u8, 0u8, 0u8]);
                self.write_response(header.msg_id, header.uid, status::OK, &response).await?;
            }
            request::CHANNELSTREAM_SEEK => {
                let wallclock_ms = body.get_i64().unwrap_or(0);
                let pts = self
                    .pipeline
                    .as_mut()
                    .and_then(|p| p.seek(wallclock_ms))
                    .unwrap_or(0);
                let mut response = BytesMut::new();
                response.extend_from_slice(&pts.to_be_bytes());
                self.write_response(header.msg_id, header.uid, status::OK, &response).await?;
            }
            other => {
                log::debug!("session {}: ignoring out-of-scope message id {other}", self.session_id);
            }
        }

        Ok(())
    }

    fn open_channel(&mut self, uid: u32, channel_uid: u32) -> u32 {
        let mut pipeline = match LivePipeline::new(&self.config, self.session_id, wire::packet::CHANNEL_STREAM, uid, "") {
            Ok(p) => p,
            Err(err) => {
                log::error!("session {}: failed to open pipeline: {err}", self.session_id);
                return status::ERROR;
            }
        };

        let cache: Arc<dyn crate::channel_cache::ChannelLookup + Send + Sync> = self.cache.clone();
        match pipeline.switch_channel(channel_uid, self.acquirer.as_ref(), cache) {
            Ok(()) => {
                self.pipeline = Some(pipeline);
                status::OK
            }
            Err(SwitchChannelError::RecordingRunning) => status::REC_RUNNING,
            Err(SwitchChannelError::DeviceBusy) => status::DATA_LOCKED,
        }
    }

    /// Reads one frame, retrying silently across idle-read timeouts (those
    /// only exist for liveness bookkeeping). Returns `None` on a clean EOF.
    async fn read_frame(&mut self) -> Result<Option<(FrameHeader, Bytes)>> {
        let mut header_buf = [0u8; HEADER_LEN];
        loop {
            match timeout(READ_IDLE_TIMEOUT, self.stream.read_exact(&mut header_buf)).await {
                Ok(Ok(_)) => break,
                Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Ok(Err(err)) => return Err(RoboTvError::Io(err)),
                Err(_) => continue,
            }
        }

        let header = FrameHeader::parse(&header_buf)?;
        let mut payload = vec![0u8; header.payload_len as usize];
        self.stream.read_exact(&mut payload).await?;
        Ok(Some((header, Bytes::from(payload))))
    }

    async fn write_response(&mut self, msg_id: u16, uid: u32, code: u32, payload: &[u8]) -> Result<()> {
        let mut msg = OutboundMessage::new(msg_id, wire::packet::CHANNEL_REQUEST_RESPONSE, uid);
        msg.put_u32(code);
        msg.put_bytes(payload);
        let frame = msg.finish();

        timeout(WRITE_TIMEOUT, self.stream.write_all(&frame))
            .await
            .map_err(|_| RoboTvError::Protocol("write timed out".into()))??;
        Ok(())
    }
}
