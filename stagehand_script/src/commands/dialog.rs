use crate::clock::SharedClock;
use crate::command::{ChoiceCommand, Command, CommandCore};
use crate::error::{Result, ScriptError};
use crate::timed::TimedCore;

pub const DEFAULT_MS_PER_CHAR: u64 = 30;
pub const DEFAULT_HOLD_MS: u64 = 1_000;

/// Dialog line revealed character by character.
///
/// Plain lines complete after the reveal plus a hold period. Lines with
/// choices stay open until a choice is selected; selecting snaps the reveal.
pub struct ShowDialog {
    core: CommandCore,
    timing: TimedCore,
    text: String,
    choices: Vec<String>,
    selected: Option<usize>,
    visible_chars: usize,
    hold: u64,
}

impl ShowDialog {
    pub fn new(clock: &SharedClock, text: impl Into<String>, choices: Vec<String>) -> Self {
        Self::with_pacing(clock, text, choices, DEFAULT_MS_PER_CHAR, DEFAULT_HOLD_MS)
    }

    pub fn with_pacing(
        clock: &SharedClock,
        text: impl Into<String>,
        choices: Vec<String>,
        ms_per_char: u64,
        hold: u64,
    ) -> Self {
        let text = text.into();
        let reveal = (text.chars().count() as u64).saturating_mul(ms_per_char);
        ShowDialog {
            core: CommandCore::new(),
            timing: TimedCore::new(clock, reveal),
            text,
            choices,
            selected: None,
            visible_chars: 0,
            hold,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Portion of the line revealed by the last `execute`.
    pub fn visible_text(&self) -> &str {
        match self.text.char_indices().nth(self.visible_chars) {
            Some((offset, _)) => &self.text[..offset],
            None => &self.text,
        }
    }

    fn total_chars(&self) -> usize {
        self.text.chars().count()
    }
}

impl Command for ShowDialog {
    fn name(&self) -> &'static str {
        "show_dialog"
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
        let Some(alpha) = self.timing.step(&mut self.core, complete, tick) else {
            return;
        };
        let total = self.total_chars();
        self.visible_chars = ((total as f32) * alpha).floor() as usize;
        self.visible_chars = self.visible_chars.min(total);
    }

    fn is_complete_at(&self, tick: u64) -> bool {
        if self.core.is_stopped() {
            return true;
        }
        if self.choices.is_empty() {
            self.timing.passed_time(&self.core, tick)
                >= self.timing.duration().saturating_add(self.hold)
        } else {
            self.selected.is_some()
        }
    }

    /// Only dialogs that offer choices act as choice commands.
    fn as_choice(&self) -> Option<&dyn ChoiceCommand> {
        if self.choices.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn as_choice_mut(&mut self) -> Option<&mut dyn ChoiceCommand> {
        if self.choices.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl ChoiceCommand for ShowDialog {
    fn choices(&self) -> &[String] {
        &self.choices
    }

    fn choice_index(&self) -> Option<usize> {
        self.selected
    }

    fn select_choice(&mut self, index: usize) -> Result<()> {
        if index >= self.choices.len() {
            return Err(ScriptError::ChoiceOutOfRange {
                index,
                count: self.choices.len(),
            });
        }
        if self.selected.is_none() && !self.core.is_stopped() {
            self.selected = Some(index);
        }
        Ok(())
    }
}
