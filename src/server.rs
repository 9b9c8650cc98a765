//! TCP accept loop: binds the listen port, enforces an allow-list, and
//! spawns one [`ClientSession`] task per accepted connection.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::channel_cache::ChannelMetadataCache;
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::DeviceAcquirer;
use crate::session::ClientSession;

/// Accepts connections on `config.listen_port`, rejecting any peer whose
/// address isn't in `allowed_hosts` (an empty list allows everyone).
pub struct ListenerLoop {
    config: Config,
    allowed_hosts: Vec<IpAddr>,
    cache: Arc<ChannelMetadataCache>,
    acquirer: Arc<dyn DeviceAcquirer + Send + Sync>,
    next_session_id: AtomicU32,
}

impl ListenerLoop {
    pub fn new(
        config: Config,
        allowed_hosts: Vec<IpAddr>,
        cache: Arc<ChannelMetadataCache>,
        acquirer: Arc<dyn DeviceAcquirer + Send + Sync>,
    ) -> Self {
        ListenerLoop {
            config,
            allowed_hosts,
            cache,
            acquirer,
            next_session_id: AtomicU32::new(1),
        }
    }

    fn is_allowed(&self, addr: IpAddr) -> bool {
        self.allowed_hosts.is_empty() || self.allowed_hosts.contains(&addr)
    }

    /// Runs the accept loop until the listener fails to bind or `shutdown`
    /// fires. Each accepted, allow-listed connection gets its own session
    /// task; sessions outlive this call and are not joined here.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.listen_port)).await?;
        log::info!("listening on port {}", self.config.listen_port);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    if !self.is_allowed(peer.ip()) {
                        log::warn!("rejecting connection from {} (not in allow-list)", peer.ip());
                        continue;
                    }

                    let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                    let config = self.config.clone();
                    let cache = Arc::clone(&self.cache);
                    let acquirer = Arc::clone(&self.acquirer);

                    tokio::spawn(async move {
                        let session = match ClientSession::new(stream, config, cache, acquirer, session_id) {
                            Ok(session) => session,
                            Err(err) => {
                                log::error!("session {session_id}: setup failed: {err}");
                                return;
                            }
                        };
                        if let Err(err) = session.run().await {
                            log::error!("session {session_id}: {err}");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    log::info!("shutdown requested, accept loop exiting");
                    return Ok(());
                }
            }
        }
    }
}
