use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use log::debug;
use mlua::{Function, Lua, MultiValue, RegistryKey, Table};

use crate::bindings;
use crate::clock::SharedClock;
use crate::command::{ChoiceCommand, Command, CommandState, SharedCommand};
use crate::cothread::{ContextTag, CothreadId};
use crate::error::{Result, ScriptError};
use crate::events::EventLog;
use crate::pause::PauseRequests;
use crate::result::{ChoiceResult, CommandResult};
use crate::scheduler::{Scheduler, ScriptSource};
use crate::world::World;

/// Everything a scripting context's bindings capture. Cloning shares the
/// underlying scheduler, tracker, world and logs.
#[derive(Clone)]
pub struct ScriptContext {
    pub tag: ContextTag,
    pub scheduler: Scheduler,
    pub clock: SharedClock,
    pub world: World,
    pub events: EventLog,
    pub pauses: PauseRequests,
    commands: Rc<RefCell<Vec<SharedCommand>>>,
    faults: Rc<RefCell<Vec<ScriptError>>>,
}

impl ScriptContext {
    pub fn new(
        tag: ContextTag,
        clock: SharedClock,
        world: World,
        events: EventLog,
        pauses: PauseRequests,
    ) -> Self {
        ScriptContext {
            tag,
            scheduler: Scheduler::new(),
            clock,
            world,
            events,
            pauses,
            commands: Rc::new(RefCell::new(Vec::new())),
            faults: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn register_command<T: Command + 'static>(&self, command: T) -> CommandResult {
        let result = CommandResult::from_command(command);
        self.commands.borrow_mut().push(result.shared().clone());
        debug!("command.register {} [{}]", result.name(), self.tag);
        result
    }

    pub fn register_choice_command<T: ChoiceCommand + 'static>(
        &self,
        command: T,
    ) -> Result<ChoiceResult> {
        let choice = ChoiceResult::from_command(command)?;
        self.commands
            .borrow_mut()
            .push(choice.as_result().shared().clone());
        debug!("command.register {} [{}]", choice.as_result().name(), self.tag);
        Ok(choice)
    }

    pub fn log(&self, message: impl Into<String>) {
        self.events.record(self.clock.ticks(), self.tag, message);
    }

    /// Holds a fault that could not be returned to the host directly, such
    /// as a child script failing inside `start_script`.
    pub fn report_fault(&self, fault: ScriptError) {
        self.faults.borrow_mut().push(fault);
    }

    fn tracked(&self) -> Vec<SharedCommand> {
        self.commands.borrow().clone()
    }
}

/// One scripting context: a scheduler, the commands its scripts registered,
/// and a Lua environment whose globals fall back to `_G` on reads.
pub struct ScriptingInterface {
    context: ScriptContext,
    environment: RegistryKey,
    held: RefCell<Vec<SharedCommand>>,
}

impl ScriptingInterface {
    pub fn new(lua: &Lua, context: ScriptContext) -> Result<Self> {
        let environment = lua.create_table()?;
        let fallback = lua.create_table()?;
        fallback.set("__index", lua.globals())?;
        environment.set_metatable(Some(fallback));
        bindings::install(lua, &environment, &context)?;
        let environment = lua.create_registry_value(environment)?;
        debug!("interface.create [{}]", context.tag);
        Ok(ScriptingInterface {
            context,
            environment,
            held: RefCell::new(Vec::new()),
        })
    }

    pub fn tag(&self) -> ContextTag {
        self.context.tag
    }

    pub fn context(&self) -> &ScriptContext {
        &self.context
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.context.scheduler
    }

    pub fn environment<'lua>(&self, lua: &'lua Lua) -> Result<Table<'lua>> {
        Ok(lua.registry_value(&self.environment)?)
    }

    pub fn schedule_code(
        &self,
        lua: &Lua,
        name: impl Into<String>,
        code: impl Into<String>,
    ) -> Result<CothreadId> {
        self.start(lua, ScriptSource::code(name, code))
    }

    pub fn schedule_file(&self, lua: &Lua, path: impl AsRef<Path>) -> Result<CothreadId> {
        self.start(lua, ScriptSource::File(path.as_ref().to_path_buf()))
    }

    pub fn schedule_function<'lua>(
        &self,
        lua: &'lua Lua,
        function: Function<'lua>,
        args: MultiValue<'lua>,
    ) -> Result<CothreadId> {
        self.start(lua, ScriptSource::Function { function, args })
    }

    fn start<'lua>(&self, lua: &'lua Lua, source: ScriptSource<'lua>) -> Result<CothreadId> {
        let environment = self.environment(lua)?;
        self.context
            .scheduler
            .start(lua, source, self.context.tag, Some(environment))
    }

    pub fn register_command<T: Command + 'static>(&self, command: T) -> CommandResult {
        self.context.register_command(command)
    }

    pub fn register_choice_command<T: ChoiceCommand + 'static>(
        &self,
        command: T,
    ) -> Result<ChoiceResult> {
        self.context.register_choice_command(command)
    }

    /// Executes every tracked command once, then forgets the completed ones.
    /// Returns how many were reaped.
    pub fn execute_commands(&self) -> usize {
        let commands = self.context.tracked();
        for command in &commands {
            command.borrow_mut().execute();
        }
        let mut tracked = self.context.commands.borrow_mut();
        let before = tracked.len();
        tracked.retain(|command| !command.borrow().is_complete());
        let reaped = before - tracked.len();
        if reaped > 0 {
            debug!(
                "command.reap {reaped} [{}], {} still active",
                self.context.tag,
                tracked.len()
            );
        }
        reaped
    }

    pub fn update(&self, lua: &Lua) -> Result<()> {
        self.context.scheduler.run(lua)
    }

    pub fn active_choices(&self) -> Vec<ChoiceResult> {
        self.context
            .tracked()
            .into_iter()
            .map(CommandResult::new)
            .filter(|result| result.is_choice() && !result.is_complete())
            .filter_map(|result| ChoiceResult::new(result).ok())
            .collect()
    }

    /// Faults reported since the last call, oldest first.
    pub fn take_faults(&self) -> Vec<ScriptError> {
        std::mem::take(&mut *self.context.faults.borrow_mut())
    }

    pub fn tracked_commands(&self) -> usize {
        self.context.commands.borrow().len()
    }

    /// Suspends the scheduler and every running command. Commands a script
    /// paused itself stay paused after `resume`.
    pub fn pause(&self) {
        self.context.scheduler.pause();
        let mut held = self.held.borrow_mut();
        for command in self.context.tracked() {
            let running = command.borrow().state() == CommandState::Running;
            if running {
                command.borrow_mut().pause();
                held.push(command);
            }
        }
    }

    pub fn resume(&self) {
        for command in self.held.borrow_mut().drain(..) {
            command.borrow_mut().resume();
        }
        self.context.scheduler.resume();
    }

    /// Force-stops every tracked command and drops every cothread.
    pub fn clear(&self, lua: &Lua) -> Result<()> {
        self.held.borrow_mut().clear();
        let commands = std::mem::take(&mut *self.context.commands.borrow_mut());
        for command in &commands {
            command.borrow_mut().force_stop();
        }
        self.context.scheduler.clear(lua)?;
        debug!(
            "interface.clear [{}] dropped {} commands",
            self.context.tag,
            commands.len()
        );
        Ok(())
    }

    /// Clears the context and releases its environment table.
    pub fn shutdown(self, lua: &Lua) -> Result<()> {
        self.clear(lua)?;
        lua.remove_registry_value(self.environment)?;
        Ok(())
    }
}
