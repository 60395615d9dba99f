use std::cell::RefCell;
use std::rc::Rc;

use log::info;
use serde::Serialize;

use crate::cothread::ContextTag;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEvent {
    pub tick: u64,
    pub context: ContextTag,
    pub message: String,
}

/// Append-only log shared by every scripting context. Scripts write to it
/// through `log(...)`; the host writes lifecycle notes.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<ScriptEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tick: u64, context: ContextTag, message: impl Into<String>) {
        let message = message.into();
        info!(target: "stagehand::script", "[{context}] {message}");
        self.events.borrow_mut().push(ScriptEvent {
            tick,
            context,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn snapshot(&self) -> Vec<ScriptEvent> {
        self.events.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::EventLog;
    use crate::cothread::ContextTag;

    #[test]
    fn clones_append_to_the_same_log() {
        let log = EventLog::new();
        let writer = log.clone();
        writer.record(5, ContextTag::Map, "door opened");
        log.record(9, ContextTag::Global, "save");
        assert_eq!(log.messages(), vec!["door opened", "save"]);
        let events = log.snapshot();
        assert_eq!(events[0].tick, 5);
        assert_eq!(events[1].context, ContextTag::Global);
    }
}
