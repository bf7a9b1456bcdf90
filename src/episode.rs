//! Episode scoring: the freeze/score/resume protocol.
//!
//! A score request from the controller arrives as two bridge rendezvous.
//! The first freezes simulation progress, reads course completion, computes
//! the score and resets the tracker for the next episode. The second
//! restores the prior time multiplier and repeats the score. Each phase runs
//! entirely inside one tick, so no physics step can land between the freeze
//! and the score read.

use tracing::debug;

use crate::codec::score_from_completion;
use crate::simulator::Simulator;

/// Tick-side state machine for episode scoring.
#[derive(Debug, Default)]
pub(crate) struct EpisodeScorer {
    frozen: bool,
    last_score: i32,
}

impl EpisodeScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service one score request.
    ///
    /// `resume_scale` is the multiplier to restore on the resume phase:
    /// the fast-forward multiplier while the toggle is on, otherwise 1.
    pub fn handle<S: Simulator>(&mut self, sim: &mut S, resume_scale: f32) -> i32 {
        if self.frozen {
            sim.set_time_scale(resume_scale);
            self.frozen = false;
            debug!(score = self.last_score, resume_scale, "episode resumed");
            self.last_score
        } else {
            let score = score_from_completion(sim.completion_fraction());
            sim.reset_course();
            sim.set_time_scale(0.0);
            self.frozen = true;
            self.last_score = score;
            debug!(score, "episode scored, simulation frozen");
            score
        }
    }

    /// Drop any frozen state, restoring real-time stepping if needed.
    /// Called when a session ends so a half-finished score exchange cannot
    /// leave the simulation stuck at time scale zero.
    pub fn reset<S: Simulator>(&mut self, sim: &mut S) {
        if self.frozen {
            sim.set_time_scale(1.0);
            self.frozen = false;
        }
        self.last_score = 0;
    }
}
