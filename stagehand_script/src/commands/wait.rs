use crate::clock::SharedClock;
use crate::command::{Command, CommandCore};
use crate::timed::TimedCore;

/// Completes once its duration has passed; used by `wait(ms)`.
pub struct Wait {
    core: CommandCore,
    timing: TimedCore,
}

impl Wait {
    pub fn new(clock: &SharedClock, duration: u64) -> Self {
        Wait {
            core: CommandCore::new(),
            timing: TimedCore::new(clock, duration),
        }
    }

    pub fn timing(&self) -> &TimedCore {
        &self.timing
    }
}

impl Command for Wait {
    fn name(&self) -> &'static str {
        "wait"
    }

    fn core(&self) -> &CommandCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore {
        &mut self.core
    }

    fn now(&self) -> u64 {
        self.timing.now()
    }

    fn execute_at(&mut self, tick: u64) {
        let complete = self.is_complete_at(tick);
        let _ = self.timing.step(&mut self.core, complete, tick);
    }

    fn is_complete_at(&self, tick: u64) -> bool {
        self.core.is_stopped() || self.timing.has_elapsed(&self.core, tick)
    }
}
