//! `ClientSession` wire-level behavior: the LOGIN handshake, protocol
//! version rejection, and framing round trip, driven over a real loopback
//! TCP connection.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use robotv_live::channel_cache::ChannelMetadataCache;
use robotv_live::config::Config;
use robotv_live::pipeline::{DeviceAcquirer, SwitchChannelError};
use robotv_live::session::ClientSession;
use robotv_live::wire::{self, FrameHeader, OutboundMessage, HEADER_LEN};

struct AlwaysGrant;
impl DeviceAcquirer for AlwaysGrant {
    fn acquire_live(&self, _channel_uid: u32) -> Result<(), SwitchChannelError> {
        Ok(())
    }
}

async fn spawn_session(dir: &std::path::Path) -> (TcpStream, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = Config {
        timeshift_dir: dir.to_path_buf(),
        max_timeshift_size: 64 * 1024,
        ..Config::default()
    };
    let cache = Arc::new(ChannelMetadataCache::new());
    let acquirer: Arc<dyn DeviceAcquirer + Send + Sync> = Arc::new(AlwaysGrant);

    let server_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let session = ClientSession::new(stream, config, cache, acquirer, 1).unwrap();
        let _ = session.run().await;
    });

    let client = TcpStream::connect(addr).await.unwrap();
    (client, server_task)
}

fn login_frame(uid: u32, protocol_version: u32) -> bytes::Bytes {
    let mut msg = OutboundMessage::new(wire::request::LOGIN, wire::packet::CHANNEL_REQUEST_RESPONSE, uid);
    msg.put_u32(protocol_version);
    msg.finish()
}

async fn read_frame(stream: &mut TcpStream) -> Option<(FrameHeader, Vec<u8>)> {
    let mut header_buf = [0u8; HEADER_LEN];
    if stream.read_exact(&mut header_buf).await.is_err() {
        return None;
    }
    let header = FrameHeader::parse(&header_buf).unwrap();
    let mut payload = vec![0u8; header.payload_len as usize];
    stream.read_exact(&mut payload).await.unwrap();
    Some((header, payload))
}

#[tokio::test]
async fn login_with_supported_version_gets_an_ok_response() {
    let dir = tempfile::tempdir().unwrap();
    let (mut client, _server) = spawn_session(dir.path()).await;

    client.write_all(&login_frame(42, 7)).await.unwrap();

    let (header, payload) = read_frame(&mut client).await.expect("server responds to a valid LOGIN");
    assert_eq!(header.msg_id, wire::request::LOGIN);
    assert_eq!(header.uid, 42);
    assert_eq!(payload[0], 0); // compression flag, never set by this crate's writers
    let code = u32::from_be_bytes(payload[1..5].try_into().unwrap());
    assert_eq!(code, wire::status::OK);
}

#[tokio::test]
async fn login_with_unsupported_version_closes_without_a_response() {
    let dir = tempfile::tempdir().unwrap();
    let (mut client, server) = spawn_session(dir.path()).await;

    client.write_all(&login_frame(1, 5)).await.unwrap();

    assert!(read_frame(&mut client).await.is_none(), "mismatched protocol version must close the session silently");
    server.await.unwrap();
}

#[tokio::test]
async fn channel_open_request_round_trips_a_response_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (mut client, _server) = spawn_session(dir.path()).await;

    client.write_all(&login_frame(1, 8)).await.unwrap();
    read_frame(&mut client).await.expect("login ok");

    let mut open = OutboundMessage::new(
        wire::request::CHANNELSTREAM_OPEN,
        wire::packet::CHANNEL_REQUEST_RESPONSE,
        9,
    );
    open.put_u32(100);
    client.write_all(&open.finish()).await.unwrap();

    let (header, payload) = read_frame(&mut client).await.expect("server responds to CHANNELSTREAM_OPEN");
    assert_eq!(header.msg_id, wire::request::CHANNELSTREAM_OPEN);
    assert_eq!(header.uid, 9);
    let code = u32::from_be_bytes(payload[1..5].try_into().unwrap());
    assert_eq!(code, wire::status::OK);
}
