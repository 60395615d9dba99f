use std::path::PathBuf;

use thiserror::Error;

use crate::cothread::ContextTag;

/// Failures surfaced by the scheduler, the scripting interface and the
/// command handles.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),
    #[error("script {label} [{context}] failed: {source}")]
    Script {
        label: String,
        context: ContextTag,
        #[source]
        source: mlua::Error,
    },
    #[error("wait called outside of a running script")]
    YieldOutsideCothread,
    #[error("command {command} does not offer choices")]
    NotChoiceCommand { command: &'static str },
    #[error("choice {index} out of range ({count} choices)")]
    ChoiceOutOfRange { index: usize, count: usize },
    #[error("reading script {path}: {source}")]
    ReadScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptError {
    /// Context tag of the cothread that faulted, when the failure came from
    /// a running script.
    pub fn context(&self) -> Option<ContextTag> {
        match self {
            ScriptError::Script { context, .. } => Some(*context),
            _ => None,
        }
    }
}

impl From<ScriptError> for mlua::Error {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Lua(inner) => inner,
            other => mlua::Error::external(other),
        }
    }
}

pub type Result<T, E = ScriptError> = std::result::Result<T, E>;
