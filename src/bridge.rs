//! Cross-context rendezvous between the network worker and the simulation
//! tick.
//!
//! The worker needs two things it cannot produce itself: a freshly captured
//! frame and an episode score. Both live on the simulation side, which runs
//! once per rendered frame and must never block. The handoff is a bounded
//! channel of capacity one carrying a request that owns its own reply
//! channel; the buffer travels with the reply, so the two contexts never
//! alias memory and the channel provides the required ordering.
//!
//! The worker awaits each reply before issuing its next request, so at most
//! one request of each kind is ever outstanding. The tick side polls with
//! `try_recv` and may hold a request pending across ticks (send-interval
//! pacing, frozen clock, waiting for the operator) without stalling the
//! render loop.

use tokio::sync::{mpsc, oneshot};

use crate::codec::Telemetry;
use crate::error::{LinkError, Result};

/// One captured camera frame plus the telemetry sampled with it.
///
/// Ownership of the pixel buffer moves through the bridge with the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    /// Row-major RGBA pixels, `width · height · 4` bytes.
    pub pixels: Vec<u8>,
    /// Telemetry sampled at capture time.
    pub telemetry: Telemetry,
}

/// A request the network worker parks on the simulation tick.
#[derive(Debug)]
pub(crate) enum TickRequest {
    /// Capture the current frame and telemetry.
    Frame(oneshot::Sender<FrameSnapshot>),
    /// Run one phase of the episode freeze/score/resume protocol.
    Score(oneshot::Sender<i32>),
    /// Resolve once the operator is actively driving (non-zero vertical).
    AwaitOperator(oneshot::Sender<()>),
}

/// Create a connected bridge pair.
pub fn bridge() -> (BridgeWorker, BridgeTick) {
    let (tx, rx) = mpsc::channel(1);
    (BridgeWorker { tx }, BridgeTick { rx })
}

/// Network-worker side of the bridge. Cloned per session; all clones feed
/// the same tick receiver.
#[derive(Clone)]
pub struct BridgeWorker {
    tx: mpsc::Sender<TickRequest>,
}

impl BridgeWorker {
    /// Block until the tick context has captured a fresh frame.
    pub async fn request_frame(&self) -> Result<FrameSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(TickRequest::Frame(reply_tx), reply_rx).await
    }

    /// Block until the tick context has serviced one score phase.
    pub async fn request_score(&self) -> Result<i32> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(TickRequest::Score(reply_tx), reply_rx).await
    }

    /// Block until the operator has begun actively driving.
    pub async fn await_operator(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(TickRequest::AwaitOperator(reply_tx), reply_rx).await
    }

    async fn submit<T>(&self, request: TickRequest, reply_rx: oneshot::Receiver<T>) -> Result<T> {
        // A closed channel or dropped reply sender means the tick side has
        // stopped servicing the bridge.
        self.tx.send(request).await.map_err(|_| LinkError::Cancelled)?;
        reply_rx.await.map_err(|_| LinkError::Cancelled)
    }
}

/// Simulation-tick side of the bridge.
pub struct BridgeTick {
    rx: mpsc::Receiver<TickRequest>,
}

impl BridgeTick {
    /// Non-blocking poll for the next parked request.
    pub(crate) fn try_next(&mut self) -> Option<TickRequest> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot(fill: u8) -> FrameSnapshot {
        FrameSnapshot {
            pixels: vec![fill; 16],
            telemetry: Telemetry {
                direction: (0.0, 0.0),
                speed: 0.0,
                steering: (0.0, 0.0),
            },
        }
    }

    #[tokio::test]
    async fn frame_request_round_trips() {
        let (worker, mut tick) = bridge();

        let service = tokio::spawn(async move {
            loop {
                if let Some(TickRequest::Frame(reply)) = tick.try_next() {
                    reply.send(snapshot(7)).unwrap();
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let got = worker.request_frame().await.unwrap();
        assert_eq!(got.pixels, vec![7u8; 16]);
        service.await.unwrap();
    }

    #[tokio::test]
    async fn overlapping_requests_never_share_a_buffer() {
        // A second frame request issued before the first is serviced must
        // not corrupt either snapshot: each reply owns its own buffer. The
        // tick side is deliberately slow to keep both requests in flight.
        let (worker, mut tick) = bridge();
        let worker2 = worker.clone();

        let service = tokio::spawn(async move {
            let mut fill = 1u8;
            let mut served = 0;
            while served < 2 {
                if let Some(TickRequest::Frame(reply)) = tick.try_next() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    reply.send(snapshot(fill)).unwrap();
                    fill += 1;
                    served += 1;
                } else {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        });

        let first = tokio::spawn(async move { worker.request_frame().await.unwrap() });
        let second = tokio::spawn(async move { worker2.request_frame().await.unwrap() });

        let a = first.await.unwrap();
        let b = second.await.unwrap();
        service.await.unwrap();

        let mut fills: Vec<u8> = vec![a.pixels[0], b.pixels[0]];
        fills.sort_unstable();
        assert_eq!(fills, vec![1, 2]);
        assert!(a.pixels.iter().all(|&p| p == a.pixels[0]));
        assert!(b.pixels.iter().all(|&p| p == b.pixels[0]));
    }

    #[tokio::test]
    async fn dropped_tick_side_cancels_the_worker() {
        let (worker, tick) = bridge();
        drop(tick);
        assert!(matches!(worker.request_score().await, Err(LinkError::Cancelled)));
    }

    #[tokio::test]
    async fn dropped_reply_cancels_the_worker() {
        let (worker, mut tick) = bridge();

        let service = tokio::spawn(async move {
            loop {
                if let Some(request) = tick.try_next() {
                    // Tick context tearing down mid-request.
                    drop(request);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        assert!(matches!(worker.await_operator().await, Err(LinkError::Cancelled)));
        service.await.unwrap();
    }
}
