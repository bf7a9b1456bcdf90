//! TCP control link for a driving simulator.
//!
//! `drivelink` connects a simulated vehicle to an external controller
//! process over a local TCP connection. Each simulation tick it exports a
//! camera frame plus telemetry; the controller replies with steering
//! commands (DRIVE mode), passively records while the operator drives
//! (RECORD mode), or asks for the current episode to be scored.
//!
//! # Architecture
//!
//! Two contexts run concurrently. The **network worker** (a tokio task)
//! owns the socket and the session state machine; the **simulation tick**
//! runs once per rendered frame, never blocks, and owns the camera, the
//! vehicle, and the clock. They meet at a single-slot request/response
//! bridge: the worker parks a request (frame capture, episode score) and
//! the tick context services it and hands the buffer back.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use drivelink::{LinkConfig, LinkManager, Simulator, TickDriver};
//! use std::time::Instant;
//!
//! fn run(sim: impl Simulator) {
//!     let config = LinkConfig::default();
//!     let (mut manager, handles) = LinkManager::new(config.clone());
//!     let mut driver = TickDriver::new(sim, handles, &config);
//!
//!     manager.start();
//!     loop {
//!         // once per rendered/physics frame
//!         driver.tick(Instant::now());
//!     }
//! }
//! ```

mod bridge;
pub mod codec;
mod config;
mod episode;
mod error;
mod manager;
mod session;
mod simulator;
mod tick;
mod transport;

pub use bridge::FrameSnapshot;
pub use codec::{ControlMessage, Telemetry};
pub use config::{DEFAULT_PORT, LinkConfig};
pub use error::{DisconnectReason, LinkError, Result};
pub use manager::{LinkHandles, LinkManager, LinkStatus};
pub use session::Mode;
pub use simulator::Simulator;
pub use tick::TickDriver;
pub use transport::{IoTransport, TcpTransport, Transport};
