use std::cell::Cell;
use std::rc::Rc;

/// Time source consumed by the scheduler and the timed commands.
///
/// Two clocks are exposed: game ticks stop advancing while the simulation is
/// paused, window ticks always advance. Both are milliseconds.
pub trait TickSource {
    fn ticks(&self) -> u64;
    fn window_ticks(&self) -> u64;
    fn is_paused(&self) -> bool;
}

pub type SharedClock = Rc<dyn TickSource>;

/// Which of the two tick counters a timed command reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Game,
    Window,
}

impl ClockSource {
    /// Commands created while the game is paused run on window ticks so
    /// pause-menu animations keep moving.
    pub fn for_clock(clock: &dyn TickSource) -> Self {
        if clock.is_paused() {
            ClockSource::Window
        } else {
            ClockSource::Game
        }
    }

    pub fn read(self, clock: &dyn TickSource) -> u64 {
        match self {
            ClockSource::Game => clock.ticks(),
            ClockSource::Window => clock.window_ticks(),
        }
    }
}

/// Fixed-step clock driven by the host loop.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: Cell<u64>,
    window_ticks: Cell<u64>,
    paused: Cell<bool>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    pub fn advance(&self, millis: u64) {
        self.window_ticks
            .set(self.window_ticks.get().saturating_add(millis));
        if !self.paused.get() {
            self.ticks.set(self.ticks.get().saturating_add(millis));
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.set(paused);
    }
}

impl TickSource for ManualClock {
    fn ticks(&self) -> u64 {
        self.ticks.get()
    }

    fn window_ticks(&self) -> u64 {
        self.window_ticks.get()
    }

    fn is_paused(&self) -> bool {
        self.paused.get()
    }
}
