//! Simulation-tick side of the link.
//!
//! [`TickDriver::tick`] is called once per rendered/physics frame and never
//! blocks: it applies link status transitions to the simulation (input
//! routing, course reset, fast-forward availability), applies the latest
//! remote steering, and services at most one parked bridge request. A frame
//! request is held pending until the send-interval pacing deadline has
//! passed and the clock is running; a score request is held while a frame
//! send is still in flight; an operator-wait request is held until the
//! vehicle's vertical steering is non-zero.

use std::time::{Duration, Instant};

use tokio::sync::{oneshot, watch};
use tracing::{debug, trace};

use crate::bridge::{BridgeTick, FrameSnapshot, TickRequest};
use crate::codec::Telemetry;
use crate::config::LinkConfig;
use crate::episode::EpisodeScorer;
use crate::manager::{LinkHandles, LinkStatus};
use crate::session::Mode;
use crate::simulator::Simulator;

/// Per-tick driver owning the simulation seam.
pub struct TickDriver<S: Simulator> {
    sim: S,
    bridge: BridgeTick,
    status_rx: watch::Receiver<LinkStatus>,
    steering_rx: watch::Receiver<Option<(f32, f32)>>,
    send_interval: Duration,
    fast_forward_speed: f32,
    scorer: EpisodeScorer,
    pending_frame: Option<oneshot::Sender<FrameSnapshot>>,
    pending_score: Option<oneshot::Sender<i32>>,
    pending_operator: Option<oneshot::Sender<()>>,
    next_send: Option<Instant>,
    fast_forward: bool,
    fast_forward_available: bool,
    last_status: LinkStatus,
}

impl<S: Simulator> TickDriver<S> {
    /// # Panics
    ///
    /// Panics if the simulator's frame dimensions disagree with the
    /// configured ones. The session sizes every wire frame from the config,
    /// so a mismatch is a programming-invariant violation, caught here on
    /// the caller's thread rather than inside the detached worker.
    pub fn new(sim: S, handles: LinkHandles, config: &LinkConfig) -> Self {
        assert_eq!(
            sim.frame_size(),
            (config.width, config.height),
            "simulator frame size does not match the configured link dimensions"
        );
        Self {
            sim,
            bridge: handles.bridge,
            status_rx: handles.status,
            steering_rx: handles.steering,
            send_interval: config.send_interval,
            fast_forward_speed: config.fast_forward_speed,
            scorer: EpisodeScorer::new(),
            pending_frame: None,
            pending_score: None,
            pending_operator: None,
            next_send: None,
            fast_forward: false,
            fast_forward_available: false,
            last_status: LinkStatus::Idle,
        }
    }

    /// Run one tick. Never blocks and never stalls the render loop.
    ///
    /// The bridge is polled before the status and steering watches: the
    /// worker publishes those before it parks a request, so any request
    /// pulled here is serviced only after the state that preceded it has
    /// been applied.
    pub fn tick(&mut self, now: Instant) {
        self.pull_request();
        self.observe_status();
        self.apply_steering();
        self.service_operator_wait();
        self.service_requests(now);
    }

    /// Current link status as last observed by this driver.
    pub fn status(&self) -> LinkStatus {
        self.status_rx.borrow().clone()
    }

    /// Whether the fast-forward affordance should be shown to the operator.
    /// True exactly while a DRIVE session is active.
    pub fn fast_forward_available(&self) -> bool {
        self.fast_forward_available
    }

    /// Whether fast-forward is currently engaged.
    pub fn fast_forward(&self) -> bool {
        self.fast_forward
    }

    /// Toggle fast-forward. Ignored unless a DRIVE session made the
    /// affordance available. The frozen-clock guard keeps a mid-score
    /// freeze intact; the scorer's resume phase picks the right multiplier.
    pub fn set_fast_forward(&mut self, on: bool) {
        if on && !self.fast_forward_available {
            return;
        }
        if on == self.fast_forward {
            return;
        }
        self.fast_forward = on;
        debug!(on, "fast-forward toggled");
        if on {
            if self.sim.time_scale() > 0.0 {
                self.sim.set_time_scale(self.fast_forward_speed);
            }
            self.sim.enter_fast_forward(self.fast_forward_speed);
        } else {
            if self.sim.time_scale() > 0.0 {
                self.sim.set_time_scale(1.0);
            }
            self.sim.exit_fast_forward();
        }
    }

    /// Access the wrapped simulator.
    pub fn simulator(&self) -> &S {
        &self.sim
    }

    /// Mutable access to the wrapped simulator.
    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    fn observe_status(&mut self) {
        if !self.status_rx.has_changed().unwrap_or(false) {
            return;
        }
        let status = self.status_rx.borrow_and_update().clone();
        debug!(?status, "link status changed");

        // The watch channel coalesces rapid transitions, so a restart can
        // overwrite Disconnected with Connecting or the next Active before
        // this context looks. The worker publishes Active exactly once per
        // session, so any notification arriving while the last observed
        // status was Active marks the end of that session and the teardown
        // must run here, whatever value the snapshot shows.
        if matches!(self.last_status, LinkStatus::Active(_)) {
            self.end_session();
        }

        match status {
            LinkStatus::Active(Mode::Record) => {
                self.sim.reset_course();
                self.sim.set_operator_input(true);
                self.fast_forward_available = false;
            }
            LinkStatus::Active(Mode::Drive) => {
                self.sim.reset_course();
                self.sim.set_operator_input(false);
                self.fast_forward_available = true;
            }
            LinkStatus::Idle | LinkStatus::Connecting | LinkStatus::Disconnected { .. } => {}
        }
        self.last_status = status;
    }

    /// Session teardown: back to manual control, real time, no
    /// fast-forward; a frozen score exchange is unwound and requests left
    /// behind by the dead worker are released.
    fn end_session(&mut self) {
        self.sim.set_operator_input(true);
        self.set_fast_forward(false);
        self.fast_forward_available = false;
        self.scorer.reset(&mut self.sim);
        self.next_send = None;
        self.prune_dead_requests();
    }

    /// Drop parked requests whose worker is gone. A request pulled this
    /// tick from a newly started session still has a live reply channel
    /// and must survive the teardown of the previous session.
    fn prune_dead_requests(&mut self) {
        if self.pending_frame.as_ref().is_some_and(|reply| reply.is_closed()) {
            self.pending_frame = None;
        }
        if self.pending_score.as_ref().is_some_and(|reply| reply.is_closed()) {
            self.pending_score = None;
        }
        if self.pending_operator.as_ref().is_some_and(|reply| reply.is_closed()) {
            self.pending_operator = None;
        }
    }

    fn apply_steering(&mut self) {
        if !self.steering_rx.has_changed().unwrap_or(false) {
            return;
        }
        let command = *self.steering_rx.borrow_and_update();
        if let Some((horizontal, vertical)) = command {
            trace!(horizontal, vertical, "applying remote steering");
            self.sim.set_steering(horizontal, vertical);
        }
    }

    fn pull_request(&mut self) {
        // The worker awaits each reply before the next request, so the
        // matching slot is always free when a request arrives.
        if let Some(request) = self.bridge.try_next() {
            match request {
                TickRequest::Frame(reply) => self.pending_frame = Some(reply),
                TickRequest::Score(reply) => self.pending_score = Some(reply),
                TickRequest::AwaitOperator(reply) => self.pending_operator = Some(reply),
            }
        }
    }

    fn service_operator_wait(&mut self) {
        if self.pending_operator.is_some() && self.sim.steering().1 != 0.0 {
            if let Some(reply) = self.pending_operator.take() {
                debug!("operator began driving");
                let _ = reply.send(());
            }
        }
    }

    /// Service at most one of frame / score per tick, frame first: the
    /// scorer must not freeze the clock while a frame send is in flight.
    fn service_requests(&mut self, now: Instant) {
        if self.pending_frame.is_some() {
            if self.sim.time_scale() > 0.0 && self.frame_due(now) {
                if let Some(reply) = self.pending_frame.take() {
                    let snapshot = self.capture();
                    self.next_send = Some(now + self.send_interval);
                    let _ = reply.send(snapshot);
                }
            }
        } else if let Some(reply) = self.pending_score.take() {
            let resume_scale = if self.fast_forward { self.fast_forward_speed } else { 1.0 };
            let score = self.scorer.handle(&mut self.sim, resume_scale);
            let _ = reply.send(score);
        }
    }

    fn frame_due(&self, now: Instant) -> bool {
        self.next_send.is_none_or(|deadline| now >= deadline)
    }

    fn capture(&mut self) -> FrameSnapshot {
        let (width, height) = self.sim.frame_size();
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        self.sim.capture_pixels(&mut pixels);
        let telemetry = Telemetry {
            direction: self.sim.direction_vector(),
            speed: self.sim.speed(),
            steering: self.sim.steering(),
        };
        trace!(len = pixels.len(), "frame captured");
        FrameSnapshot { pixels, telemetry }
    }
}
