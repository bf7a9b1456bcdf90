//! Wire format for the control link.
//!
//! Outbound, once per tick: `width·height·4` RGBA bytes (row-major, byte
//! order R,G,B,A) followed by 5 byte-quantized telemetry values. Inbound
//! messages have their meaning determined purely by byte count: 2 bytes is a
//! steering command, 1 byte requests an episode score, 0 bytes is the peer
//! closing, and anything longer is a protocol violation.

use crate::error::{LinkError, Result};

/// Handshake byte selecting RECORD mode.
pub const MODE_RECORD: u8 = 30;

/// Handshake byte selecting DRIVE mode.
pub const MODE_DRIVE: u8 = 31;

/// Number of telemetry bytes appended to the pixel buffer.
pub const TELEMETRY_LEN: usize = 5;

/// Number of bytes in a score reply.
pub const SCORE_LEN: usize = 4;

/// Telemetry snapshot taken alongside each camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Unit vector toward the course direction, components in [-1, 1].
    pub direction: (f32, f32),
    /// Vehicle speed in simulation units.
    pub speed: f32,
    /// Current (horizontal, vertical) steering, components in [-1, 1].
    pub steering: (f32, f32),
}

impl Telemetry {
    /// Quantize to the 5-byte wire form: dir.x, dir.y, speed, steer.h, steer.v.
    pub fn encode(&self) -> [u8; TELEMETRY_LEN] {
        [
            quantize_unit(self.direction.0),
            quantize_unit(self.direction.1),
            quantize_speed(self.speed),
            quantize_unit(self.steering.0),
            quantize_unit(self.steering.1),
        ]
    }
}

/// Map a value in [-1, 1] onto a byte: `(v + 1) · 127.5`.
pub fn quantize_unit(v: f32) -> u8 {
    ((v + 1.0) * 127.5) as u8
}

/// Map a speed onto a byte: `speed · 3 + 100`.
pub fn quantize_speed(speed: f32) -> u8 {
    (speed * 3.0 + 100.0) as u8
}

/// Inverse of the steering quantization: `byte / 127.5 − 1`.
pub fn decode_steering(bytes: [u8; 2]) -> (f32, f32) {
    (bytes[0] as f32 / 127.5 - 1.0, bytes[1] as f32 / 127.5 - 1.0)
}

/// Lay out one wire frame: pixel bytes followed by quantized telemetry.
///
/// A pixel buffer whose length disagrees with the declared dimensions is a
/// programming-invariant violation, not a runtime condition, so this panics
/// rather than returning an error.
pub fn encode_frame(pixels: &[u8], telemetry: &Telemetry, width: u32, height: u32) -> Vec<u8> {
    let pixel_len = width as usize * height as usize * 4;
    assert_eq!(
        pixels.len(),
        pixel_len,
        "pixel buffer length does not match {width}x{height} RGBA frame"
    );

    let mut frame = Vec::with_capacity(pixel_len + TELEMETRY_LEN);
    frame.extend_from_slice(pixels);
    frame.extend_from_slice(&telemetry.encode());
    frame
}

/// Convert an episode completion fraction in [0, 1] to a wire score.
pub fn score_from_completion(completion: f32) -> i32 {
    (completion.clamp(0.0, 1.0) * 100.0).round() as i32
}

/// Encode a score as the 4-byte little-endian wire reply.
pub fn encode_score(score: i32) -> [u8; SCORE_LEN] {
    score.to_le_bytes()
}

/// One inbound control message, classified by length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMessage {
    /// 2 bytes: apply this (horizontal, vertical) steering.
    Steering { horizontal: f32, vertical: f32 },
    /// 1 byte: score the current episode (content ignored).
    ScoreRequest,
    /// 0 bytes: the peer closed the connection.
    Closed,
}

impl ControlMessage {
    /// Classify an inbound message by its byte count.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            0 => Ok(ControlMessage::Closed),
            1 => Ok(ControlMessage::ScoreRequest),
            2 => {
                let (horizontal, vertical) = decode_steering([bytes[0], bytes[1]]);
                Ok(ControlMessage::Steering { horizontal, vertical })
            }
            n => Err(LinkError::protocol_violation(format!("unexpected {n}-byte control message"))),
        }
    }
}
