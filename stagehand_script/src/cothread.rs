use std::fmt;

use mlua::RegistryKey;
use serde::Serialize;

/// Logical owner of a script; selects which environment its globals live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ContextTag {
    #[serde(rename = "MAP")]
    Map,
    #[serde(rename = "GLOBAL")]
    Global,
    #[serde(rename = "PAUSE")]
    PauseMenu,
}

impl ContextTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextTag::Map => "MAP",
            ContextTag::Global => "GLOBAL",
            ContextTag::PauseMenu => "PAUSE",
        }
    }
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CothreadId(pub u32);

impl fmt::Display for CothreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One suspended or running script: the Lua thread (kept alive through the
/// registry) plus the bookkeeping used for diagnostics.
#[derive(Debug)]
pub struct Cothread {
    id: CothreadId,
    label: String,
    context: ContextTag,
    thread: RegistryKey,
    resumes: u32,
}

impl Cothread {
    pub(crate) fn new(id: CothreadId, label: String, context: ContextTag, thread: RegistryKey) -> Self {
        Cothread {
            id,
            label,
            context,
            thread,
            resumes: 0,
        }
    }

    pub fn id(&self) -> CothreadId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn context(&self) -> ContextTag {
        self.context
    }

    pub fn resumes(&self) -> u32 {
        self.resumes
    }

    pub(crate) fn thread_key(&self) -> &RegistryKey {
        &self.thread
    }

    pub(crate) fn record_resume(&mut self) {
        self.resumes = self.resumes.saturating_add(1);
    }

    pub(crate) fn into_thread_key(self) -> RegistryKey {
        self.thread
    }

    pub fn describe(&self) -> String {
        format!("{} {} [{}]", self.label, self.id, self.context)
    }
}
