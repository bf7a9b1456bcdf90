//! Operator-tunable link configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default TCP port the controller listens on.
pub const DEFAULT_PORT: u16 = 38698;

/// Configuration for the control link.
///
/// These are the operator-tunable parameters external to the protocol core:
/// where to dial, how often to export frames, and how aggressively
/// fast-forward accelerates the simulation. Frame dimensions are fixed for
/// the lifetime of a session; every wire frame in a session has the same
/// size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Controller endpoint to dial.
    pub endpoint: SocketAddr,

    /// Camera frame width in pixels.
    pub width: u32,

    /// Camera frame height in pixels.
    pub height: u32,

    /// Minimum interval between frame captures. Frame requests arriving
    /// earlier stay pending until the interval has elapsed.
    pub send_interval: Duration,

    /// Optional bound on the initial dial. `None` leaves the connect attempt
    /// to the operating system's own timeout.
    pub connect_timeout: Option<Duration>,

    /// Simulation time-step multiplier applied while fast-forward is on.
    /// Sensible range is roughly 1..=20.
    pub fast_forward_speed: f32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            width: 160,
            height: 120,
            send_interval: Duration::from_millis(100),
            connect_timeout: None,
            fast_forward_speed: 5.0,
        }
    }
}

impl LinkConfig {
    /// Size in bytes of the pixel portion of a wire frame.
    pub fn pixel_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Total size in bytes of one wire frame (pixels + telemetry).
    pub fn frame_len(&self) -> usize {
        self.pixel_len() + crate::codec::TELEMETRY_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = LinkConfig::default();
        assert_eq!(config.endpoint.port(), DEFAULT_PORT);
        assert!(config.endpoint.ip().is_loopback());
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn frame_len_accounts_for_telemetry() {
        let config = LinkConfig { width: 8, height: 4, ..Default::default() };
        assert_eq!(config.pixel_len(), 8 * 4 * 4);
        assert_eq!(config.frame_len(), 8 * 4 * 4 + 5);
    }
}
