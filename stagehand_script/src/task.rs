use mlua::{Function, Lua, RegistryKey, Value};

use crate::result::CommandResult;

/// Condition a suspended cothread waits on.
pub trait SchedulerTask {
    fn is_complete(&self, lua: &Lua) -> mlua::Result<bool>;

    fn describe(&self) -> String;
}

impl SchedulerTask for CommandResult {
    fn is_complete(&self, _lua: &Lua) -> mlua::Result<bool> {
        Ok(CommandResult::is_complete(self))
    }

    fn describe(&self) -> String {
        format!("command {}", self.name())
    }
}

/// Ready on the next scheduler pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct NextTick;

impl SchedulerTask for NextTick {
    fn is_complete(&self, _lua: &Lua) -> mlua::Result<bool> {
        Ok(true)
    }

    fn describe(&self) -> String {
        "next tick".to_string()
    }
}

/// Host-side predicate.
pub struct Predicate {
    label: String,
    check: Box<dyn Fn() -> bool>,
}

impl Predicate {
    pub fn new(label: impl Into<String>, check: impl Fn() -> bool + 'static) -> Self {
        Predicate {
            label: label.into(),
            check: Box::new(check),
        }
    }
}

impl SchedulerTask for Predicate {
    fn is_complete(&self, _lua: &Lua) -> mlua::Result<bool> {
        Ok((self.check)())
    }

    fn describe(&self) -> String {
        format!("predicate {}", self.label)
    }
}

/// Lua function polled once per pass; any truthy return completes the wait.
pub struct LuaPredicate {
    function: RegistryKey,
}

impl LuaPredicate {
    pub fn new(lua: &Lua, function: Function) -> mlua::Result<Self> {
        Ok(LuaPredicate {
            function: lua.create_registry_value(function)?,
        })
    }
}

impl SchedulerTask for LuaPredicate {
    fn is_complete(&self, lua: &Lua) -> mlua::Result<bool> {
        let function: Function = lua.registry_value(&self.function)?;
        let value: Value = function.call(())?;
        Ok(!matches!(value, Value::Nil | Value::Boolean(false)))
    }

    fn describe(&self) -> String {
        "lua predicate".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use mlua::{Function, Lua};

    use super::{LuaPredicate, NextTick, Predicate, SchedulerTask};

    #[test]
    fn lua_predicate_uses_lua_truthiness() -> anyhow::Result<()> {
        let lua = Lua::new();
        lua.load("flag = 0").exec()?;
        let check: Function = lua.load("return function() return flag end").eval()?;
        let task = LuaPredicate::new(&lua, check)?;
        assert!(task.is_complete(&lua)?);
        lua.load("flag = false").exec()?;
        assert!(!task.is_complete(&lua)?);
        lua.load("flag = nil").exec()?;
        assert!(!task.is_complete(&lua)?);
        Ok(())
    }

    #[test]
    fn host_predicate_and_next_tick() -> anyhow::Result<()> {
        let lua = Lua::new();
        let flag = Rc::new(Cell::new(false));
        let observed = flag.clone();
        let task = Predicate::new("flag", move || observed.get());
        assert!(!task.is_complete(&lua)?);
        flag.set(true);
        assert!(task.is_complete(&lua)?);
        assert!(NextTick.is_complete(&lua)?);
        assert_eq!(task.describe(), "predicate flag");
        Ok(())
    }
}
