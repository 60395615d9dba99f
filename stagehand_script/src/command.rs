use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Running,
    Paused,
    Stopped,
    ForceStopped,
}

/// Lifecycle bookkeeping shared by every command: the run state, the pause
/// interval tracking and whether the finishing step already ran.
#[derive(Debug, Clone)]
pub struct CommandCore {
    state: CommandState,
    pause_start: Option<u64>,
    paused_time: u64,
    finished: bool,
}

impl Default for CommandCore {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandCore {
    pub fn new() -> Self {
        CommandCore {
            state: CommandState::Running,
            pause_start: None,
            paused_time: 0,
            finished: false,
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == CommandState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        matches!(
            self.state,
            CommandState::Stopped | CommandState::ForceStopped
        )
    }

    pub fn is_force_stopped(&self) -> bool {
        self.state == CommandState::ForceStopped
    }

    pub fn pause_start(&self) -> Option<u64> {
        self.pause_start
    }

    /// Total time spent paused across completed pause intervals.
    pub fn paused_time(&self) -> u64 {
        self.paused_time
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn mark_finished(&mut self) {
        self.finished = true;
    }

    pub fn pause(&mut self, tick: u64) {
        if self.state == CommandState::Running {
            self.state = CommandState::Paused;
            self.pause_start = Some(tick);
        }
    }

    pub fn resume(&mut self, tick: u64) {
        if self.state != CommandState::Paused {
            return;
        }
        if let Some(start) = self.pause_start.take() {
            self.paused_time = self
                .paused_time
                .saturating_add(tick.saturating_sub(start));
        }
        self.state = CommandState::Running;
    }

    // An open pause interval is left in place when stopping, so progress
    // stays frozen at the tick the pause began.
    pub fn stop(&mut self) {
        if !self.is_stopped() {
            self.state = CommandState::Stopped;
        }
    }

    pub fn force_stop(&mut self) {
        self.state = CommandState::ForceStopped;
    }
}

/// A deferred, steppable gameplay action advanced once per logic tick.
///
/// Implementors provide the tick-explicit `execute_at`/`is_complete_at`;
/// the tick-implicit forms read the command's own clock through `now`.
pub trait Command {
    fn name(&self) -> &'static str;

    fn core(&self) -> &CommandCore;

    fn core_mut(&mut self) -> &mut CommandCore;

    /// Current tick on the clock this command measures itself against.
    fn now(&self) -> u64;

    fn execute_at(&mut self, tick: u64);

    fn is_complete_at(&self, tick: u64) -> bool;

    fn as_choice(&self) -> Option<&dyn ChoiceCommand> {
        None
    }

    fn as_choice_mut(&mut self) -> Option<&mut dyn ChoiceCommand> {
        None
    }

    fn execute(&mut self) {
        let tick = self.now();
        self.execute_at(tick);
    }

    fn is_complete(&self) -> bool {
        self.is_complete_at(self.now())
    }

    fn pause_at(&mut self, tick: u64) {
        self.core_mut().pause(tick);
    }

    fn pause(&mut self) {
        let tick = self.now();
        self.pause_at(tick);
    }

    fn resume_at(&mut self, tick: u64) {
        self.core_mut().resume(tick);
    }

    fn resume(&mut self) {
        let tick = self.now();
        self.resume_at(tick);
    }

    fn stop(&mut self) {
        self.core_mut().stop();
    }

    fn force_stop(&mut self) {
        self.core_mut().force_stop();
    }

    fn is_stopped(&self) -> bool {
        self.core().is_stopped()
    }

    fn is_paused(&self) -> bool {
        self.core().is_paused()
    }

    fn state(&self) -> CommandState {
        self.core().state()
    }
}

/// Capability offered by dialog-style commands that end with a selection.
pub trait ChoiceCommand: Command {
    fn choices(&self) -> &[String];

    /// Selected choice, `None` until one is picked (or if the dialog was
    /// stopped first).
    fn choice_index(&self) -> Option<usize>;

    fn select_choice(&mut self, index: usize) -> Result<()>;
}

pub type SharedCommand = Rc<RefCell<dyn Command>>;

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::{Command, CommandCore, CommandState};
    use crate::clock::{ManualClock, TickSource};

    /// Completes once its own clock reaches `until`.
    struct Deadline {
        core: CommandCore,
        clock: Rc<ManualClock>,
        until: u64,
    }

    impl Command for Deadline {
        fn name(&self) -> &'static str {
            "deadline"
        }

        fn core(&self) -> &CommandCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut CommandCore {
            &mut self.core
        }

        fn now(&self) -> u64 {
            self.clock.ticks()
        }

        fn execute_at(&mut self, _tick: u64) {}

        fn is_complete_at(&self, tick: u64) -> bool {
            self.core.is_stopped() || tick >= self.until
        }
    }

    #[test]
    fn tick_implicit_forms_read_the_command_clock() {
        let clock = ManualClock::shared();
        let mut deadline = Deadline {
            core: CommandCore::new(),
            clock: clock.clone(),
            until: 50,
        };
        assert!(!deadline.is_complete());

        clock.advance(20);
        deadline.pause();
        assert_eq!(deadline.core().pause_start(), Some(20));
        clock.advance(15);
        deadline.resume();
        assert_eq!(deadline.core().paused_time(), 15);

        clock.advance(15);
        deadline.execute();
        assert!(deadline.is_complete());
    }

    #[test]
    fn pause_and_resume_accumulate_paused_time() {
        let mut core = CommandCore::new();
        core.pause(100);
        assert_eq!(core.state(), CommandState::Paused);
        assert_eq!(core.pause_start(), Some(100));
        core.pause(150);
        assert_eq!(core.pause_start(), Some(100));
        core.resume(160);
        assert_eq!(core.state(), CommandState::Running);
        assert_eq!(core.paused_time(), 60);
        core.resume(200);
        assert_eq!(core.paused_time(), 60);
    }

    #[test]
    fn terminal_states_ignore_pause_requests() {
        let mut core = CommandCore::new();
        core.stop();
        core.pause(10);
        assert_eq!(core.state(), CommandState::Stopped);
        core.force_stop();
        assert_eq!(core.state(), CommandState::ForceStopped);
        core.stop();
        assert_eq!(core.state(), CommandState::ForceStopped);
        assert!(core.is_stopped());
    }
}
