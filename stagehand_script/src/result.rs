use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::command::{ChoiceCommand, Command, CommandState, SharedCommand};
use crate::error::{Result, ScriptError};

/// Handle handed to script callers for a registered command. Cloning the
/// handle shares the command; it never owns it uniquely.
#[derive(Clone)]
pub struct CommandResult {
    command: SharedCommand,
}

impl CommandResult {
    pub fn new(command: SharedCommand) -> Self {
        CommandResult { command }
    }

    pub fn from_command<T: Command + 'static>(command: T) -> Self {
        let shared: SharedCommand = Rc::new(RefCell::new(command));
        Self::new(shared)
    }

    pub fn shared(&self) -> &SharedCommand {
        &self.command
    }

    pub fn name(&self) -> &'static str {
        self.command.borrow().name()
    }

    pub fn state(&self) -> CommandState {
        self.command.borrow().state()
    }

    pub fn is_complete(&self) -> bool {
        self.command.borrow().is_complete()
    }

    pub fn is_complete_at(&self, tick: u64) -> bool {
        self.command.borrow().is_complete_at(tick)
    }

    pub fn execute(&self) {
        self.command.borrow_mut().execute();
    }

    pub fn execute_at(&self, tick: u64) {
        self.command.borrow_mut().execute_at(tick);
    }

    pub fn stop(&self) {
        self.command.borrow_mut().stop();
    }

    pub fn force_stop(&self) {
        self.command.borrow_mut().force_stop();
    }

    pub fn pause(&self) {
        self.command.borrow_mut().pause();
    }

    pub fn pause_at(&self, tick: u64) {
        self.command.borrow_mut().pause_at(tick);
    }

    pub fn resume(&self) {
        self.command.borrow_mut().resume();
    }

    pub fn resume_at(&self, tick: u64) {
        self.command.borrow_mut().resume_at(tick);
    }

    pub fn is_stopped(&self) -> bool {
        self.command.borrow().is_stopped()
    }

    pub fn is_paused(&self) -> bool {
        self.command.borrow().is_paused()
    }

    pub fn is_choice(&self) -> bool {
        self.command.borrow().as_choice().is_some()
    }

    /// Selected choice of a dialog-style command. Asking a command without
    /// choices is a usage error, not an empty answer.
    pub fn choice_index(&self) -> Result<Option<usize>> {
        let command = self.command.borrow();
        match command.as_choice() {
            Some(choice) => Ok(choice.choice_index()),
            None => Err(ScriptError::NotChoiceCommand {
                command: command.name(),
            }),
        }
    }

    pub fn select_choice(&self, index: usize) -> Result<()> {
        let mut command = self.command.borrow_mut();
        let name = command.name();
        match command.as_choice_mut() {
            Some(choice) => choice.select_choice(index),
            None => Err(ScriptError::NotChoiceCommand { command: name }),
        }
    }

    pub fn choices(&self) -> Result<Vec<String>> {
        let command = self.command.borrow();
        match command.as_choice() {
            Some(choice) => Ok(choice.choices().to_vec()),
            None => Err(ScriptError::NotChoiceCommand {
                command: command.name(),
            }),
        }
    }

    pub fn same_command(&self, other: &CommandResult) -> bool {
        Rc::ptr_eq(&self.command, &other.command)
    }
}

impl fmt::Debug for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandResult")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Handle over a command known to offer choices.
#[derive(Clone, Debug)]
pub struct ChoiceResult {
    result: CommandResult,
}

impl ChoiceResult {
    pub fn new(result: CommandResult) -> Result<Self> {
        if !result.is_choice() {
            return Err(ScriptError::NotChoiceCommand {
                command: result.name(),
            });
        }
        Ok(ChoiceResult { result })
    }

    pub fn from_command<T: ChoiceCommand + 'static>(command: T) -> Result<Self> {
        Self::new(CommandResult::from_command(command))
    }

    pub fn as_result(&self) -> &CommandResult {
        &self.result
    }

    pub fn into_result(self) -> CommandResult {
        self.result
    }

    pub fn choice_index(&self) -> Option<usize> {
        self.result.choice_index().ok().flatten()
    }

    pub fn choices(&self) -> Vec<String> {
        self.result.choices().unwrap_or_default()
    }

    pub fn select_choice(&self, index: usize) -> Result<()> {
        self.result.select_choice(index)
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChoiceResult, CommandResult};
    use crate::clock::{ManualClock, SharedClock};
    use crate::commands::{ShowDialog, Wait};
    use crate::error::ScriptError;

    #[test]
    fn stop_then_execute_converges_and_stays_complete() {
        let manual = ManualClock::shared();
        let clock: SharedClock = manual.clone();
        let result = CommandResult::from_command(Wait::new(&clock, 60_000));
        result.stop();
        let mut calls = 0;
        while !result.is_complete() {
            result.execute();
            calls += 1;
            assert!(calls < 4);
        }
        for _ in 0..10 {
            result.execute();
            assert!(result.is_complete());
            assert!(result.is_stopped());
        }
    }

    #[test]
    fn clones_share_one_command() {
        let manual = ManualClock::shared();
        let clock: SharedClock = manual.clone();
        let first = CommandResult::from_command(Wait::new(&clock, 100));
        let second = first.clone();
        second.pause();
        assert!(first.is_paused());
        first.resume();
        assert!(!second.is_paused());
        assert!(first.same_command(&second));
    }

    #[test]
    fn choice_queries_on_plain_commands_fail_loudly() {
        let manual = ManualClock::shared();
        let clock: SharedClock = manual.clone();
        let result = CommandResult::from_command(Wait::new(&clock, 100));
        assert!(matches!(
            result.choice_index(),
            Err(ScriptError::NotChoiceCommand { command: "wait" })
        ));
        assert!(matches!(
            ChoiceResult::new(result),
            Err(ScriptError::NotChoiceCommand { .. })
        ));
    }

    #[test]
    fn choice_result_reports_selection() {
        let manual = ManualClock::shared();
        let clock: SharedClock = manual.clone();
        let dialog = ShowDialog::new(&clock, "Pick", vec!["a".into(), "b".into()]);
        let choice = ChoiceResult::from_command(dialog).expect("dialog offers choices");
        assert_eq!(choice.choice_index(), None);
        assert_eq!(choice.choices(), vec!["a".to_string(), "b".to_string()]);
        choice.select_choice(0).expect("in range");
        assert_eq!(choice.choice_index(), Some(0));
        assert!(choice.is_complete());
    }
}
