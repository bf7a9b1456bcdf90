//! Connection lifecycle.
//!
//! [`LinkManager`] owns the network worker: `start` spawns it and returns
//! immediately, `stop` cancels it, and exactly one worker is alive at a
//! time — starting while one is running cancels the old worker and the new
//! one waits for it to finish before dialing. Every worker exit, clean or
//! not, publishes [`LinkStatus::Disconnected`] so the tick/UI side reverts
//! to manual control and shows the reconnect affordance. Reconnection is
//! operator-initiated; nothing retries automatically.

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::{self, BridgeTick, BridgeWorker};
use crate::config::LinkConfig;
use crate::error::{DisconnectReason, LinkError, Result};
use crate::session::{Mode, Session};
use crate::transport::{TcpTransport, Transport};

/// Observable state of the link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkStatus {
    /// No session has been started yet.
    Idle,
    /// A worker is dialing the controller.
    Connecting,
    /// A session is live in the given mode.
    Active(Mode),
    /// The last session ended; manual control, reconnect available.
    Disconnected { reason: DisconnectReason },
}

/// Channels handed to the simulation-tick side at construction.
pub struct LinkHandles {
    pub(crate) bridge: BridgeTick,
    pub(crate) status: watch::Receiver<LinkStatus>,
    pub(crate) steering: watch::Receiver<Option<(f32, f32)>>,
}

/// Owner of the network worker and the link's shared channels.
pub struct LinkManager {
    config: LinkConfig,
    bridge: BridgeWorker,
    steering_tx: watch::Sender<Option<(f32, f32)>>,
    status_tx: watch::Sender<LinkStatus>,
    status_rx: watch::Receiver<LinkStatus>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl LinkManager {
    /// Create the manager and the channel bundle for the tick side.
    pub fn new(config: LinkConfig) -> (Self, LinkHandles) {
        let (bridge_worker, bridge_tick) = bridge::bridge();
        let (steering_tx, steering_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(LinkStatus::Idle);

        let handles = LinkHandles {
            bridge: bridge_tick,
            status: status_rx.clone(),
            steering: steering_rx,
        };
        let manager = Self {
            config,
            bridge: bridge_worker,
            steering_tx,
            status_tx,
            status_rx,
            cancel: CancellationToken::new(),
            worker: None,
        };
        (manager, handles)
    }

    /// Spawn a worker that dials the configured endpoint and runs a session.
    /// Returns immediately; progress is visible on the status channel.
    pub fn start(&mut self) {
        let endpoint = self.config.endpoint;
        let timeout = self.config.connect_timeout;
        self.spawn_worker(async move { TcpTransport::dial(endpoint, timeout).await });
    }

    /// Spawn a worker over an already-established transport. Used by tests
    /// and by hosts that manage their own connection.
    pub fn start_with<T: Transport + 'static>(&mut self, transport: T) {
        self.spawn_worker(std::future::ready(Ok(transport)));
    }

    fn spawn_worker<T, F>(&mut self, connect: F)
    where
        T: Transport + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        // Cancel any live worker; the new one waits for it below so that
        // exactly one worker touches the bridge at a time.
        self.cancel.cancel();
        let previous = self.worker.take();

        let cancel = CancellationToken::new();
        self.cancel = cancel.clone();

        let bridge = self.bridge.clone();
        let steering_tx = self.steering_tx.clone();
        let status_tx = self.status_tx.clone();
        let (width, height) = (self.config.width, self.config.height);

        self.worker = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }

            status_tx.send_replace(LinkStatus::Connecting);

            let result = run_session(
                connect,
                bridge,
                steering_tx.clone(),
                status_tx.clone(),
                cancel,
                width,
                height,
            )
            .await;

            let reason = match &result {
                Ok(()) => DisconnectReason::PeerClosed,
                Err(err) if err.is_clean_close() => {
                    info!(%err, "session ended");
                    DisconnectReason::from(err)
                }
                Err(err) => {
                    warn!(%err, "session failed");
                    DisconnectReason::from(err)
                }
            };

            // Stale steering must not be applied by a later session.
            steering_tx.send_replace(None);
            status_tx.send_replace(LinkStatus::Disconnected { reason });
        }));
    }

    /// Cancel the worker and wait for it to finish. Safe to call when no
    /// session is active.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    /// Current link status.
    pub fn status(&self) -> LinkStatus {
        self.status_rx.borrow().clone()
    }

    /// Status transitions as a stream, starting from the current value.
    pub fn status_stream(&self) -> impl Stream<Item = LinkStatus> + use<> {
        WatchStream::new(self.status_rx.clone())
    }

    /// Whether a worker is currently alive.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    #[cfg(test)]
    pub(crate) fn bridge_worker(&self) -> BridgeWorker {
        self.bridge.clone()
    }

    #[cfg(test)]
    pub(crate) fn publish_status_for_test(&self, status: LinkStatus) {
        self.status_tx.send_replace(status);
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_session<T, F>(
    connect: F,
    bridge: BridgeWorker,
    steering_tx: watch::Sender<Option<(f32, f32)>>,
    status_tx: watch::Sender<LinkStatus>,
    cancel: CancellationToken,
    width: u32,
    height: u32,
) -> Result<()>
where
    T: Transport + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let transport = tokio::select! {
        _ = cancel.cancelled() => return Err(LinkError::Cancelled),
        r = connect => r?,
    };
    Session::new(transport, bridge, steering_tx, status_tx, cancel, width, height).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::IoTransport;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn manager() -> (LinkManager, LinkHandles) {
        LinkManager::new(LinkConfig { width: 2, height: 2, ..Default::default() })
    }

    #[tokio::test]
    async fn stop_without_session_is_a_no_op() {
        let (mut manager, _handles) = manager();
        assert_eq!(manager.status(), LinkStatus::Idle);
        manager.stop().await;
        assert_eq!(manager.status(), LinkStatus::Idle);
    }

    #[tokio::test]
    async fn failed_dial_publishes_connect_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        drop(listener);

        let config = LinkConfig { endpoint, width: 2, height: 2, ..Default::default() };
        let (mut manager, _handles) = LinkManager::new(config);
        let mut statuses = manager.status_stream();

        manager.start();
        loop {
            let status = statuses.next().await.unwrap();
            if let LinkStatus::Disconnected { reason } = status {
                assert_eq!(reason, DisconnectReason::ConnectFailure);
                break;
            }
        }
        manager.stop().await;
    }

    #[tokio::test]
    async fn peer_close_during_handshake_reports_peer_closed() {
        let (ours, theirs) = tokio::io::duplex(256);
        let (mut manager, _handles) = manager();

        manager.start_with(IoTransport::new(ours));
        drop(theirs);

        let mut statuses = manager.status_stream();
        loop {
            let status = statuses.next().await.unwrap();
            if let LinkStatus::Disconnected { reason } = status {
                assert_eq!(reason, DisconnectReason::PeerClosed);
                break;
            }
        }
        manager.stop().await;
    }

    #[tokio::test]
    async fn restart_cancels_the_previous_worker() {
        let (ours_a, mut theirs_a) = tokio::io::duplex(256);
        let (ours_b, mut theirs_b) = tokio::io::duplex(256);
        let (mut manager, _handles) = manager();

        manager.start_with(IoTransport::new(ours_a));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Second start: the first worker is cancelled, its transport shut
        // down, and the second session proceeds alone.
        manager.start_with(IoTransport::new(ours_b));

        // First peer observes the shutdown as EOF.
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(
            Duration::from_secs(1),
            tokio::io::AsyncReadExt::read(&mut theirs_a, &mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(n, 0);

        // Second session is still alive and completes a handshake.
        theirs_b.write_all(&[31]).await.unwrap();
        let mut statuses = manager.status_stream();
        loop {
            let status = statuses.next().await.unwrap();
            if status == LinkStatus::Active(Mode::Drive) {
                break;
            }
        }
        manager.stop().await;
    }

    #[tokio::test]
    async fn stop_cancels_an_active_session() {
        let (ours, mut theirs) = tokio::io::duplex(256);
        let (mut manager, _handles) = manager();

        manager.start_with(IoTransport::new(ours));
        theirs.write_all(&[31]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.stop().await;
        assert_eq!(
            manager.status(),
            LinkStatus::Disconnected { reason: DisconnectReason::Cancelled }
        );
    }
}
