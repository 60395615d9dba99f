use crate::clock::{ClockSource, SharedClock};
use crate::command::CommandCore;

/// Pause-aware progress tracking for commands that run over a duration.
///
/// The clock source is fixed when the command is built: commands created
/// while the game is paused measure window ticks for their whole life.
#[derive(Clone)]
pub struct TimedCore {
    clock: SharedClock,
    source: ClockSource,
    start_time: u64,
    duration: u64,
}

impl TimedCore {
    pub fn new(clock: &SharedClock, duration: u64) -> Self {
        let source = ClockSource::for_clock(clock.as_ref());
        let start_time = source.read(clock.as_ref());
        TimedCore {
            clock: clock.clone(),
            source,
            start_time,
            duration,
        }
    }

    pub fn now(&self) -> u64 {
        self.source.read(self.clock.as_ref())
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Active time since the start, excluding paused intervals. An open pause
    /// freezes the value at the tick the pause began.
    pub fn passed_time(&self, core: &CommandCore, tick: u64) -> u64 {
        let effective = match core.pause_start() {
            Some(pause_start) => pause_start.min(tick),
            None => tick,
        };
        effective
            .saturating_sub(self.start_time)
            .saturating_sub(core.paused_time())
    }

    pub fn has_elapsed(&self, core: &CommandCore, tick: u64) -> bool {
        self.passed_time(core, tick) >= self.duration
    }

    pub fn alpha(&self, core: &CommandCore, complete: bool, tick: u64) -> f32 {
        if complete || self.duration == 0 {
            return 1.0;
        }
        let ratio = self.passed_time(core, tick) as f64 / self.duration as f64;
        ratio.clamp(0.0, 1.0) as f32
    }

    /// Interpolation factor to apply for this tick, or `None` when nothing
    /// should be written: after the finishing step ran, after a force stop,
    /// or while paused. Marks the finishing step done once `complete` holds.
    pub fn step(&self, core: &mut CommandCore, complete: bool, tick: u64) -> Option<f32> {
        if core.is_finished() {
            return None;
        }
        if core.is_force_stopped() {
            core.mark_finished();
            return None;
        }
        if core.is_paused() && !complete {
            return None;
        }
        let alpha = self.alpha(core, complete, tick);
        if complete {
            core.mark_finished();
        }
        Some(alpha)
    }
}
