//! Seam to the simulation collaborators.
//!
//! The link core never renders pixels, steps physics, or owns the clock. It
//! drives all of that through this trait, which the host application
//! implements over its camera, vehicle, course tracker, and time-scale
//! mechanism. Every method is called from the simulation-tick context only,
//! so implementations need no internal synchronization.

/// External collaborators of the link: camera, vehicle, course and clock.
pub trait Simulator {
    /// Fixed camera frame dimensions for the life of the process.
    fn frame_size(&self) -> (u32, u32);

    /// Write the current camera view into `pixels` as row-major RGBA.
    /// The buffer is pre-sized to `width · height · 4`.
    fn capture_pixels(&mut self, pixels: &mut [u8]);

    /// Unit vector toward the course direction, components in [-1, 1].
    fn direction_vector(&self) -> (f32, f32);

    /// Current vehicle speed in simulation units.
    fn speed(&self) -> f32;

    /// Current (horizontal, vertical) steering, components in [-1, 1].
    fn steering(&self) -> (f32, f32);

    /// Apply a remote (horizontal, vertical) steering command.
    fn set_steering(&mut self, horizontal: f32, vertical: f32);

    /// Route steering from the operator (`true`) or the remote peer (`false`).
    fn set_operator_input(&mut self, enabled: bool);

    /// Fraction of the current episode completed, in [0, 1].
    fn completion_fraction(&self) -> f32;

    /// Reset course progress for the next episode.
    fn reset_course(&mut self);

    /// Current simulation time-step multiplier (0 = frozen).
    fn time_scale(&self) -> f32;

    /// Set the simulation time-step multiplier.
    fn set_time_scale(&mut self, scale: f32);

    /// Fast-forward engaged: shorten the fixed step and shed non-essential
    /// presentation work (audio, full-size rendering) for throughput.
    fn enter_fast_forward(&mut self, multiplier: f32);

    /// Fast-forward released: restore real-time stepping and presentation.
    fn exit_fast_forward(&mut self);
}
