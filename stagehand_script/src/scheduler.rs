use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::mem;
use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, error};
use mlua::{Error as LuaError, Function, Lua, MultiValue, Table, Thread, ThreadStatus};

use crate::cothread::{ContextTag, Cothread, CothreadId};
use crate::error::{Result, ScriptError};
use crate::task::{NextTick, SchedulerTask};

/// What a new cothread runs.
pub enum ScriptSource<'lua> {
    Code { name: String, code: String },
    File(PathBuf),
    Function {
        function: Function<'lua>,
        args: MultiValue<'lua>,
    },
}

impl<'lua> ScriptSource<'lua> {
    pub fn code(name: impl Into<String>, code: impl Into<String>) -> Self {
        ScriptSource::Code {
            name: name.into(),
            code: code.into(),
        }
    }

    pub fn function(function: Function<'lua>) -> Self {
        ScriptSource::Function {
            function,
            args: MultiValue::new(),
        }
    }
}

struct PendingTask {
    cothread: Cothread,
    task: Box<dyn SchedulerTask>,
}

/// A cothread currently inside `Thread::resume`. Frames nest when a resumed
/// script starts another script.
struct Frame {
    id: CothreadId,
    context: ContextTag,
    yielded: Option<Box<dyn SchedulerTask>>,
    stopped: bool,
}

#[derive(Default)]
struct SchedulerState {
    pending: Vec<PendingTask>,
    resuming: Vec<Frame>,
    live: BTreeMap<CothreadId, String>,
    stopped: BTreeSet<CothreadId>,
    paused: bool,
    next_id: u32,
}

/// Cooperative scheduler for the cothreads of one scripting context.
///
/// Cloning yields another handle onto the same scheduler; Lua bindings hold
/// such handles. No `RefCell` borrow is held across a Lua resume, so resumed
/// scripts may start, stop or yield through the scheduler re-entrantly.
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cothread and runs it synchronously until it yields or ends.
    /// Code and files are loaded with `environment` as their globals table.
    pub fn start<'lua>(
        &self,
        lua: &'lua Lua,
        source: ScriptSource<'lua>,
        context: ContextTag,
        environment: Option<Table<'lua>>,
    ) -> Result<CothreadId> {
        let (label, function, args) = match source {
            ScriptSource::Code { name, code } => {
                let function = load_chunk(lua, &name, code.as_bytes(), environment)?;
                (name, function, MultiValue::new())
            }
            ScriptSource::File(path) => {
                let bytes = fs::read(&path).map_err(|source| ScriptError::ReadScript {
                    path: path.clone(),
                    source,
                })?;
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("script")
                    .to_string();
                let function = load_chunk(lua, &name, &bytes, environment)?;
                (name, function, MultiValue::new())
            }
            ScriptSource::Function { function, args } => {
                (describe_function(&function), function, args)
            }
        };

        let thread = lua.create_thread(function)?;
        let key = lua.create_registry_value(thread.clone())?;
        let id = {
            let mut state = self.state.borrow_mut();
            state.next_id = state.next_id.wrapping_add(1);
            let id = CothreadId(state.next_id);
            state.live.insert(id, label.clone());
            id
        };
        let cothread = Cothread::new(id, label, context, key);
        debug!("cothread.start {}", cothread.describe());
        self.step(lua, cothread, thread, args)?;
        Ok(id)
    }

    /// Resumes every cothread whose task is satisfied, in yield order.
    ///
    /// Only entries pending when the pass begins are visited; anything
    /// yielded during the pass waits for the next call. A script fault ends
    /// the pass early and is returned; unvisited entries stay queued.
    pub fn run(&self, lua: &Lua) -> Result<()> {
        let batch = {
            let mut state = self.state.borrow_mut();
            if state.paused {
                return Ok(());
            }
            mem::take(&mut state.pending)
        };

        let mut kept = Vec::with_capacity(batch.len());
        let mut remaining = batch.into_iter();
        let mut outcome = Ok(());
        for entry in remaining.by_ref() {
            if let Err(err) = self.service(lua, entry, &mut kept) {
                outcome = Err(err);
                break;
            }
        }

        let mut state = self.state.borrow_mut();
        let added = mem::take(&mut state.pending);
        state.pending = kept;
        state.pending.extend(remaining);
        state.pending.extend(added);
        outcome
    }

    /// Records the task the currently resuming cothread is about to yield on.
    pub fn yield_task(&self, task: Box<dyn SchedulerTask>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match state.resuming.last_mut() {
            Some(frame) => {
                frame.yielded = Some(task);
                Ok(())
            }
            None => Err(ScriptError::YieldOutsideCothread),
        }
    }

    /// Stops a cothread. A cothread that is mid-resume finishes its current
    /// step and is dropped at its next yield instead of being queued.
    pub fn stop(&self, lua: &Lua, id: CothreadId) -> Result<bool> {
        let removed = {
            let mut state = self.state.borrow_mut();
            if !state.live.contains_key(&id) || state.stopped.contains(&id) {
                return Ok(false);
            }
            if let Some(frame) = state.resuming.iter_mut().find(|frame| frame.id == id) {
                frame.stopped = true;
                state.stopped.insert(id);
                return Ok(true);
            }
            let position = state
                .pending
                .iter()
                .position(|entry| entry.cothread.id() == id);
            match position {
                Some(index) => Some(state.pending.remove(index)),
                None => {
                    // Held by an in-progress `run` pass.
                    state.stopped.insert(id);
                    None
                }
            }
        };
        if let Some(entry) = removed {
            debug!("cothread.stop {}", entry.cothread.describe());
            self.retire(lua, entry.cothread)?;
        }
        Ok(true)
    }

    /// Drops every cothread without resuming it.
    pub fn clear(&self, lua: &Lua) -> Result<()> {
        let pending = {
            let mut state = self.state.borrow_mut();
            for frame in state.resuming.iter_mut() {
                frame.stopped = true;
            }
            mem::take(&mut state.pending)
        };
        for entry in pending {
            self.retire(lua, entry.cothread)?;
        }
        let mut state = self.state.borrow_mut();
        let running: BTreeSet<CothreadId> = state.resuming.iter().map(|frame| frame.id).collect();
        let detached: Vec<CothreadId> = state
            .live
            .keys()
            .filter(|id| !running.contains(id))
            .copied()
            .collect();
        state.stopped.extend(detached);
        Ok(())
    }

    pub fn pending_tasks(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn pause(&self) {
        self.state.borrow_mut().paused = true;
    }

    pub fn resume(&self) {
        self.state.borrow_mut().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    pub fn is_running(&self, id: CothreadId) -> bool {
        let state = self.state.borrow();
        state.live.contains_key(&id) && !state.stopped.contains(&id)
    }

    pub fn has_label(&self, label: &str) -> bool {
        let state = self.state.borrow();
        state
            .live
            .iter()
            .any(|(id, existing)| existing == label && !state.stopped.contains(id))
    }

    pub fn running_labels(&self) -> Vec<String> {
        let state = self.state.borrow();
        state
            .live
            .iter()
            .filter(|(id, _)| !state.stopped.contains(id))
            .map(|(_, label)| label.clone())
            .collect()
    }

    pub fn live_count(&self) -> usize {
        let state = self.state.borrow();
        state
            .live
            .keys()
            .filter(|id| !state.stopped.contains(id))
            .count()
    }

    /// Cothread currently being resumed, innermost first.
    pub fn current_cothread(&self) -> Option<CothreadId> {
        self.state.borrow().resuming.last().map(|frame| frame.id)
    }

    pub fn current_context(&self) -> Option<ContextTag> {
        self.state.borrow().resuming.last().map(|frame| frame.context)
    }

    fn service(&self, lua: &Lua, entry: PendingTask, kept: &mut Vec<PendingTask>) -> Result<()> {
        let PendingTask { cothread, task } = entry;
        if self.state.borrow().stopped.contains(&cothread.id()) {
            debug!("cothread.stop {}", cothread.describe());
            return self.retire(lua, cothread);
        }
        let thread: Thread = lua.registry_value(cothread.thread_key())?;
        if !matches!(thread.status(), ThreadStatus::Resumable) {
            debug!("cothread.dead {}", cothread.describe());
            return self.retire(lua, cothread);
        }
        match task.is_complete(lua) {
            Ok(true) => {
                drop(task);
                self.step(lua, cothread, thread, MultiValue::new())
            }
            Ok(false) => {
                kept.push(PendingTask { cothread, task });
                Ok(())
            }
            Err(err) => {
                let label = cothread.label().to_string();
                let context = cothread.context();
                error!("script {label} [{context}] wait condition failed: {err}");
                self.retire(lua, cothread)?;
                Err(ScriptError::Script {
                    label,
                    context,
                    source: err,
                })
            }
        }
    }

    fn step<'lua>(
        &self,
        lua: &'lua Lua,
        mut cothread: Cothread,
        thread: Thread<'lua>,
        args: MultiValue<'lua>,
    ) -> Result<()> {
        self.state.borrow_mut().resuming.push(Frame {
            id: cothread.id(),
            context: cothread.context(),
            yielded: None,
            stopped: false,
        });
        let outcome = thread.resume::<_, MultiValue>(args);
        let frame = self.state.borrow_mut().resuming.pop();
        cothread.record_resume();

        let (yielded, stopped) = match frame {
            Some(frame) => (frame.yielded, frame.stopped),
            None => (None, false),
        };
        let stopped = stopped || self.state.borrow().stopped.contains(&cothread.id());

        match outcome {
            Ok(_) if stopped => {
                debug!("cothread.stop {}", cothread.describe());
                self.retire(lua, cothread)
            }
            Ok(_) if matches!(thread.status(), ThreadStatus::Resumable) => {
                let task = yielded.unwrap_or_else(|| Box::new(NextTick));
                debug!(
                    "cothread.yield {} on {}",
                    cothread.describe(),
                    task.describe()
                );
                self.state
                    .borrow_mut()
                    .pending
                    .push(PendingTask { cothread, task });
                Ok(())
            }
            Ok(_) | Err(LuaError::CoroutineInactive) => {
                debug!(
                    "cothread.complete {} after {} resumes",
                    cothread.describe(),
                    cothread.resumes()
                );
                self.retire(lua, cothread)
            }
            Err(err) => {
                let label = cothread.label().to_string();
                let context = cothread.context();
                error!("script {label} [{context}] failed: {err}");
                self.retire(lua, cothread)?;
                Err(ScriptError::Script {
                    label,
                    context,
                    source: err,
                })
            }
        }
    }

    fn retire(&self, lua: &Lua, cothread: Cothread) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            state.live.remove(&cothread.id());
            state.stopped.remove(&cothread.id());
        }
        lua.remove_registry_value(cothread.into_thread_key())?;
        Ok(())
    }
}

fn load_chunk<'lua>(
    lua: &'lua Lua,
    name: &str,
    code: &[u8],
    environment: Option<Table<'lua>>,
) -> mlua::Result<Function<'lua>> {
    let chunk = lua.load(code).set_name(name);
    match environment {
        Some(environment) => chunk.set_environment(environment).into_function(),
        None => chunk.into_function(),
    }
}

pub(crate) fn describe_function(func: &Function) -> String {
    let info = func.info();
    if let Some(name) = info.name.clone() {
        if !name.is_empty() {
            return name;
        }
    }
    if let Some(short) = info.short_src.clone() {
        if let Some(line) = info.line_defined {
            if line > 0 {
                return format!("{short}:{line}");
            }
        }
        return format!("function@{short}");
    }
    match info.what {
        "C" => "<cfunction>".to_string(),
        other => format!("<{other}>"),
    }
}
