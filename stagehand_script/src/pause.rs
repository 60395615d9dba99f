use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::cothread::ContextTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseLabel {
    Pause,
    Resume,
}

impl PauseLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseLabel::Pause => "pause",
            PauseLabel::Resume => "resume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PauseRequest {
    pub label: PauseLabel,
    pub context: ContextTag,
}

#[derive(Debug, Default)]
struct PauseState {
    queued: Vec<PauseRequest>,
    history: Vec<PauseRequest>,
}

/// Pause/resume requests raised by scripts through `game_pauser`. The host
/// drains them between ticks, so a script never flips the clock mid-pass.
#[derive(Debug, Clone, Default)]
pub struct PauseRequests {
    state: Rc<RefCell<PauseState>>,
}

impl PauseRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, label: PauseLabel, context: ContextTag) {
        let request = PauseRequest { label, context };
        let mut state = self.state.borrow_mut();
        state.queued.push(request);
        state.history.push(request);
    }

    pub fn drain(&self) -> Vec<PauseRequest> {
        std::mem::take(&mut self.state.borrow_mut().queued)
    }

    pub fn history(&self) -> Vec<PauseRequest> {
        self.state.borrow().history.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{PauseLabel, PauseRequests};
    use crate::cothread::ContextTag;

    #[test]
    fn drain_empties_queue_but_keeps_history() {
        let requests = PauseRequests::new();
        requests.request(PauseLabel::Pause, ContextTag::Map);
        requests.request(PauseLabel::Resume, ContextTag::PauseMenu);
        let drained = requests.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].label, PauseLabel::Pause);
        assert!(requests.drain().is_empty());
        assert_eq!(requests.history().len(), 2);
    }
}
