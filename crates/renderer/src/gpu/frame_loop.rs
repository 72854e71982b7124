use std::time::Instant;

use super::backend::Gl;
use super::program::ProgramLifecycle;

/// Uniform receiving seconds elapsed since the first drawn frame.
pub const TIME_UNIFORM: &str = "iTime";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    Stopped,
    NoProgram,
    Drawn { time: f32 },
}

/// Start/stop state for a player's per-frame callback.
///
/// The host owns the actual animation clock and calls [`RenderLoop::frame`]
/// once per redraw; stopping simply turns those calls into no-ops.
#[derive(Debug, Default)]
pub struct RenderLoop {
    running: bool,
    started_at: Option<Instant>,
    frames: u64,
    warned_idle: bool,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.warned_idle = false;
        true
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Forgets the time origin so the next frame starts again at zero.
    pub fn reset(&mut self) {
        self.running = false;
        self.started_at = None;
        self.frames = 0;
        self.warned_idle = false;
    }

    pub fn elapsed(&self, now: Instant) -> f32 {
        self.started_at
            .map(|start| now.saturating_duration_since(start).as_secs_f32())
            .unwrap_or(0.0)
    }

    pub fn frame<G: Gl>(&mut self, lifecycle: &mut ProgramLifecycle<G>, now: Instant) -> FrameOutcome {
        if !self.running {
            return FrameOutcome::Stopped;
        }
        if !lifecycle.is_active() {
            if !self.warned_idle {
                self.warned_idle = true;
                tracing::warn!(
                    context = lifecycle.reporter().context().unwrap_or("-"),
                    "render loop running without an active program"
                );
            }
            return FrameOutcome::NoProgram;
        }
        self.warned_idle = false;
        let start = *self.started_at.get_or_insert(now);
        let time = now.saturating_duration_since(start).as_secs_f32();
        lifecycle.set_uniform(TIME_UNIFORM, time);
        if !lifecycle.draw() {
            return FrameOutcome::NoProgram;
        }
        self.frames += 1;
        FrameOutcome::Drawn { time }
    }
}
