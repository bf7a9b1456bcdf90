//! Session state machine.
//!
//! One session covers one connection: dial, a one-byte mode handshake, then
//! the mode's message loop until the peer closes, the transport fails, the
//! protocol is violated, or the link is cancelled. The mode never changes
//! after the handshake, and every frame sent in a session has the same size.
//!
//! Every blocking point (socket I/O and bridge rendezvous) races the
//! cancellation token, so tearing the link down always unblocks the worker.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::bridge::BridgeWorker;
use crate::codec::{self, ControlMessage, MODE_DRIVE, MODE_RECORD};
use crate::error::{LinkError, Result};
use crate::manager::LinkStatus;
use crate::transport::Transport;

/// Receive buffer size. The protocol's largest inbound message is 2 bytes;
/// anything longer than that is reported as a violation, so a small buffer
/// with headroom is enough.
const MAX_CONTROL_LEN: usize = 16;

/// Session mode, chosen once by the first inbound byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The operator drives; the link passively exports frames.
    Record,
    /// The remote peer steers; the operator may engage fast-forward.
    Drive,
}

impl Mode {
    pub(crate) fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            MODE_RECORD => Some(Mode::Record),
            MODE_DRIVE => Some(Mode::Drive),
            _ => None,
        }
    }

    /// The handshake byte selecting this mode.
    pub fn as_wire(self) -> u8 {
        match self {
            Mode::Record => MODE_RECORD,
            Mode::Drive => MODE_DRIVE,
        }
    }
}

/// One active session over an established transport.
pub(crate) struct Session<T: Transport> {
    transport: T,
    bridge: BridgeWorker,
    steering_tx: watch::Sender<Option<(f32, f32)>>,
    status_tx: watch::Sender<LinkStatus>,
    cancel: CancellationToken,
    width: u32,
    height: u32,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: T,
        bridge: BridgeWorker,
        steering_tx: watch::Sender<Option<(f32, f32)>>,
        status_tx: watch::Sender<LinkStatus>,
        cancel: CancellationToken,
        width: u32,
        height: u32,
    ) -> Self {
        Self { transport, bridge, steering_tx, status_tx, cancel, width, height }
    }

    /// Run the session to completion. The write half is shut down on every
    /// exit path, whatever step failed; the read half closes when the
    /// transport is dropped with the session.
    pub async fn run(mut self) -> Result<()> {
        let result = self.handshake_and_loop().await;
        self.transport.shutdown().await;
        result
    }

    async fn handshake_and_loop(&mut self) -> Result<()> {
        let mode = self.handshake().await?;
        info!(?mode, "session established");

        // The tick side observes this transition and resets course progress
        // and input routing before it services the first frame request.
        self.status_tx.send_replace(LinkStatus::Active(mode));

        match mode {
            Mode::Record => self.record_loop().await,
            Mode::Drive => self.drive_loop().await,
        }
    }

    /// Block for the one-byte mode selector.
    async fn handshake(&mut self) -> Result<Mode> {
        let message = self.recv_message().await?;
        let Some(&byte) = message.first() else {
            return Err(LinkError::PeerClosed);
        };
        Mode::from_wire(byte).ok_or_else(|| {
            LinkError::protocol_violation(format!("unrecognized mode byte {byte}"))
        })
    }

    /// RECORD: wait for the operator to start driving, then stream frames.
    /// Reply content is discarded; only a zero-length read ends the loop.
    async fn record_loop(&mut self) -> Result<()> {
        self.with_cancel(self.bridge.await_operator()).await?;
        debug!("operator active, starting record stream");

        loop {
            self.send_frame().await?;
            let reply = self.recv_message().await?;
            if reply.is_empty() {
                return Err(LinkError::PeerClosed);
            }
        }
    }

    /// DRIVE: stream frames and dispatch replies by length.
    async fn drive_loop(&mut self) -> Result<()> {
        loop {
            self.send_frame().await?;
            let reply = self.recv_message().await?;

            match ControlMessage::parse(&reply)? {
                ControlMessage::Steering { horizontal, vertical } => {
                    trace!(horizontal, vertical, "steering command");
                    self.steering_tx.send_replace(Some((horizontal, vertical)));
                }
                ControlMessage::ScoreRequest => self.score_exchange().await?,
                ControlMessage::Closed => return Err(LinkError::PeerClosed),
            }
        }
    }

    /// The two-phase score exchange: freeze and score, reply, wait for one
    /// filler message, then resume and reply with the score again. The
    /// repeated send matches the observed wire behavior of the system this
    /// protocol was built against.
    async fn score_exchange(&mut self) -> Result<()> {
        let score = self.with_cancel(self.bridge.request_score()).await?;
        debug!(score, "episode scored");
        self.send_all(&codec::encode_score(score)).await?;

        let filler = self.recv_message().await?;
        if filler.is_empty() {
            return Err(LinkError::PeerClosed);
        }

        let score = self.with_cancel(self.bridge.request_score()).await?;
        self.send_all(&codec::encode_score(score)).await?;
        Ok(())
    }

    /// Capture a frame through the bridge and send it on the wire.
    async fn send_frame(&mut self) -> Result<()> {
        let snapshot = self.with_cancel(self.bridge.request_frame()).await?;
        let frame =
            codec::encode_frame(&snapshot.pixels, &snapshot.telemetry, self.width, self.height);
        trace!(len = frame.len(), "sending frame");
        self.send_all(&frame).await
    }

    async fn recv_message(&mut self) -> Result<Vec<u8>> {
        let mut buf = [0u8; MAX_CONTROL_LEN];
        let n = tokio::select! {
            _ = self.cancel.cancelled() => return Err(LinkError::Cancelled),
            r = self.transport.recv(&mut buf) => {
                r.map_err(|e| LinkError::transport("recv", e))?
            }
        };
        Ok(buf[..n].to_vec())
    }

    async fn send_all(&mut self, bytes: &[u8]) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(LinkError::Cancelled),
            r = self.transport.send_all(bytes) => {
                r.map_err(|e| LinkError::transport("send", e))
            }
        }
    }

    async fn with_cancel<F, O>(&self, fut: F) -> Result<O>
    where
        F: Future<Output = Result<O>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(LinkError::Cancelled),
            r = fut => r,
        }
    }
}
