use log::warn;
use mlua::{
    AnyUserData, Function, Lua, MetaMethod, MultiValue, Table, UserData, UserDataMethods, Value,
    Variadic,
};

use crate::commands::{FadeEntity, MoveCamera, MoveEntity, ShowDialog, Wait};
use crate::cothread::CothreadId;
use crate::error::{Result, ScriptError};
use crate::interface::ScriptContext;
use crate::pause::PauseLabel;
use crate::result::CommandResult;
use crate::scheduler::{describe_function, ScriptSource};
use crate::task::{LuaPredicate, NextTick, SchedulerTask};
use crate::world::{EntityRef, TargetRef, Vec2};

const PRELUDE: &str = r#"
local yield_task, coroutine_yield = ...

function wait(condition)
    yield_task(condition)
    return coroutine_yield()
end
"#;

/// Script-side view of a registered command.
#[derive(Clone)]
pub struct CommandHandle {
    result: CommandResult,
}

impl CommandHandle {
    pub fn new(result: CommandResult) -> Self {
        CommandHandle { result }
    }

    pub fn result(&self) -> &CommandResult {
        &self.result
    }
}

impl UserData for CommandHandle {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("name", |_, this, ()| Ok(this.result.name()));
        methods.add_method("is_complete", |_, this, ()| Ok(this.result.is_complete()));
        methods.add_method("is_stopped", |_, this, ()| Ok(this.result.is_stopped()));
        methods.add_method("is_paused", |_, this, ()| Ok(this.result.is_paused()));
        methods.add_method("stop", |_, this, ()| {
            this.result.stop();
            Ok(())
        });
        methods.add_method("force_stop", |_, this, ()| {
            this.result.force_stop();
            Ok(())
        });
        methods.add_method("pause", |_, this, ()| {
            this.result.pause();
            Ok(())
        });
        methods.add_method("resume", |_, this, ()| {
            this.result.resume();
            Ok(())
        });
        methods.add_method("execute", |_, this, ()| {
            this.result.execute();
            Ok(())
        });
        methods.add_method("choice_index", |_, this, ()| {
            Ok(this.result.choice_index()?)
        });
        methods.add_method("select_choice", |_, this, index: usize| {
            Ok(this.result.select_choice(index)?)
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("command<{}:{:?}>", this.result.name(), this.result.state()))
        });
    }
}

/// Installs the script API into `environment`. Every binding captures
/// `context`, so a script always talks to the interface that owns it.
pub(crate) fn install(lua: &Lua, environment: &Table, context: &ScriptContext) -> Result<()> {
    environment.set("SCRIPT_CONTEXT", context.tag.as_str())?;
    install_wait(lua, environment, context)?;
    install_script_control(lua, environment, context)?;
    install_commands(lua, environment, context)?;
    install_world(lua, environment, context)?;
    install_host(lua, environment, context)?;
    install_game_pauser(lua, environment, context)?;
    Ok(())
}

fn install_wait(lua: &Lua, environment: &Table, context: &ScriptContext) -> Result<()> {
    let yield_context = context.clone();
    let yield_task = lua.create_function(move |lua, condition: Value| {
        let task = yielded_task(lua, &yield_context, condition)?;
        yield_context.scheduler.yield_task(task)?;
        Ok(())
    })?;
    let coroutine: Table = lua.globals().get("coroutine")?;
    let coroutine_yield: Function = coroutine.get("yield")?;
    lua.load(PRELUDE)
        .set_name("=stagehand_prelude")
        .set_environment(environment.clone())
        .call::<_, ()>((yield_task, coroutine_yield))?;
    Ok(())
}

fn yielded_task(
    lua: &Lua,
    context: &ScriptContext,
    condition: Value,
) -> mlua::Result<Box<dyn SchedulerTask>> {
    match condition {
        Value::Nil => Ok(Box::new(NextTick)),
        Value::Integer(_) | Value::Number(_) => {
            let duration = value_to_millis(&condition).unwrap_or(0);
            Ok(Box::new(
                context.register_command(Wait::new(&context.clock, duration)),
            ))
        }
        Value::Function(check) => Ok(Box::new(LuaPredicate::new(lua, check)?)),
        Value::UserData(data) => Ok(Box::new(command_result(&data)?)),
        other => Err(mlua::Error::RuntimeError(format!(
            "wait: cannot wait on a {}",
            other.type_name()
        ))),
    }
}

fn install_script_control(lua: &Lua, environment: &Table, context: &ScriptContext) -> Result<()> {
    let start_context = context.clone();
    environment.set(
        "start_script",
        lua.create_function(move |lua, mut args: Variadic<Value>| {
            if args.is_empty() {
                return Ok(None);
            }
            let function = extract_function(args.remove(0))?;
            start_function(lua, &start_context, function, args)
        })?,
    )?;

    let single_context = context.clone();
    environment.set(
        "single_start_script",
        lua.create_function(move |lua, mut args: Variadic<Value>| {
            if args.is_empty() {
                return Ok(None);
            }
            let function = extract_function(args.remove(0))?;
            let label = describe_function(&function);
            if single_context.scheduler.has_label(&label) {
                return Ok(None);
            }
            start_function(lua, &single_context, function, args)
        })?,
    )?;

    let stop_context = context.clone();
    environment.set(
        "stop_script",
        lua.create_function(move |lua, id: u32| {
            Ok(stop_context.scheduler.stop(lua, CothreadId(id))?)
        })?,
    )?;

    let running_context = context.clone();
    environment.set(
        "is_script_running",
        lua.create_function(move |_, id: u32| {
            Ok(running_context.scheduler.is_running(CothreadId(id)))
        })?,
    )?;

    let current_context = context.clone();
    environment.set(
        "current_script",
        lua.create_function(move |_, ()| {
            Ok(current_context.scheduler.current_cothread().map(|id| id.0))
        })?,
    )?;
    Ok(())
}

/// Starts a child cothread. A child that faults on its first run is retired
/// and its fault handed to the host; the parent carries on with nil.
fn start_function<'lua>(
    lua: &'lua Lua,
    context: &ScriptContext,
    function: Function<'lua>,
    args: Variadic<Value<'lua>>,
) -> mlua::Result<Option<u32>> {
    let args = MultiValue::from_vec(args.into_iter().collect());
    let source = ScriptSource::Function { function, args };
    match context.scheduler.start(lua, source, context.tag, None) {
        Ok(id) => Ok(Some(id.0)),
        Err(fault @ ScriptError::Script { .. }) => {
            if let ScriptError::Script { label, .. } = &fault {
                warn!("start_script: {label} failed before its first yield");
            }
            context.report_fault(fault);
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn install_commands(lua: &Lua, environment: &Table, context: &ScriptContext) -> Result<()> {
    let move_context = context.clone();
    environment.set(
        "move_entity",
        lua.create_function(move |_, (name, x, y, ms): (String, f32, f32, Option<f64>)| {
            let target = entity_target(&move_context, &name);
            let command = MoveEntity::new(
                &move_context.clock,
                target,
                Vec2::new(x, y),
                millis(ms),
            );
            Ok(CommandHandle::new(move_context.register_command(command)))
        })?,
    )?;

    let fade_context = context.clone();
    environment.set(
        "fade_entity",
        lua.create_function(move |_, (name, opacity, ms): (String, f32, Option<f64>)| {
            let target = entity_target(&fade_context, &name);
            let command = FadeEntity::new(&fade_context.clock, target, opacity, millis(ms));
            Ok(CommandHandle::new(fade_context.register_command(command)))
        })?,
    )?;

    let camera_context = context.clone();
    environment.set(
        "move_camera",
        lua.create_function(move |_, (x, y, ms): (f32, f32, Option<f64>)| {
            let command = MoveCamera::new(
                &camera_context.clock,
                camera_context.world.camera(),
                Vec2::new(x, y),
                millis(ms),
            );
            Ok(CommandHandle::new(camera_context.register_command(command)))
        })?,
    )?;

    let dialog_context = context.clone();
    environment.set(
        "show_dialog",
        lua.create_function(
            move |_, (text, choices): (String, Option<Vec<String>>)| {
                let choices = choices.unwrap_or_default();
                let has_choices = !choices.is_empty();
                let dialog = ShowDialog::new(&dialog_context.clock, text, choices);
                let result = if has_choices {
                    dialog_context.register_choice_command(dialog)?.into_result()
                } else {
                    dialog_context.register_command(dialog)
                };
                Ok(CommandHandle::new(result))
            },
        )?,
    )?;
    Ok(())
}

fn install_world(lua: &Lua, environment: &Table, context: &ScriptContext) -> Result<()> {
    let spawn_context = context.clone();
    environment.set(
        "spawn_entity",
        lua.create_function(move |_, (name, x, y): (String, Option<f32>, Option<f32>)| {
            spawn_context
                .world
                .spawn(&name, Vec2::new(x.unwrap_or(0.0), y.unwrap_or(0.0)));
            Ok(())
        })?,
    )?;

    let despawn_context = context.clone();
    environment.set(
        "despawn_entity",
        lua.create_function(move |_, name: String| Ok(despawn_context.world.despawn(&name)))?,
    )?;

    let position_context = context.clone();
    environment.set(
        "entity_position",
        lua.create_function(move |_, name: String| {
            let position = position_context
                .world
                .entity(&name)
                .and_then(|entity| entity.with(|entity| entity.position));
            Ok(match position {
                Some(position) => (Some(position.x), Some(position.y)),
                None => (None, None),
            })
        })?,
    )?;

    let opacity_context = context.clone();
    environment.set(
        "entity_opacity",
        lua.create_function(move |_, name: String| {
            Ok(opacity_context
                .world
                .entity(&name)
                .and_then(|entity| entity.with(|entity| entity.opacity)))
        })?,
    )?;
    Ok(())
}

fn install_host(lua: &Lua, environment: &Table, context: &ScriptContext) -> Result<()> {
    let log_context = context.clone();
    environment.set(
        "log",
        lua.create_function(move |_, args: Variadic<Value>| {
            let message = args
                .iter()
                .map(describe_value)
                .collect::<Vec<_>>()
                .join(" ");
            log_context.log(message);
            Ok(())
        })?,
    )?;

    let ticks_context = context.clone();
    environment.set(
        "ticks",
        lua.create_function(move |_, ()| Ok(ticks_context.clock.ticks()))?,
    )?;

    let window_context = context.clone();
    environment.set(
        "window_ticks",
        lua.create_function(move |_, ()| Ok(window_context.clock.window_ticks()))?,
    )?;

    let paused_context = context.clone();
    environment.set(
        "game_paused",
        lua.create_function(move |_, ()| Ok(paused_context.clock.is_paused()))?,
    )?;
    Ok(())
}

fn install_game_pauser(lua: &Lua, environment: &Table, context: &ScriptContext) -> Result<()> {
    let game_pauser = lua.create_table()?;
    for label in [PauseLabel::Pause, PauseLabel::Resume] {
        let pause_context = context.clone();
        game_pauser.set(
            label.as_str(),
            lua.create_function(move |_, _args: Variadic<Value>| {
                pause_context.pauses.request(label, pause_context.tag);
                Ok(())
            })?,
        )?;
    }
    environment.set("game_pauser", game_pauser)?;
    Ok(())
}

fn command_result(data: &AnyUserData) -> mlua::Result<CommandResult> {
    let handle = data.borrow::<CommandHandle>()?;
    Ok(handle.result.clone())
}

fn entity_target(context: &ScriptContext, name: &str) -> EntityRef {
    context
        .world
        .entity(name)
        .unwrap_or_else(TargetRef::dangling)
}

fn extract_function(value: Value) -> mlua::Result<Function> {
    match value {
        Value::Function(function) => Ok(function),
        other => Err(mlua::Error::RuntimeError(format!(
            "expected a function, got {}",
            other.type_name()
        ))),
    }
}

fn value_to_millis(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(i) => Some((*i).max(0) as u64),
        Value::Number(n) => Some(millis(Some(*n))),
        _ => None,
    }
}

fn millis(value: Option<f64>) -> u64 {
    match value {
        Some(ms) if ms.is_finite() && ms > 0.0 => ms.round() as u64,
        _ => 0,
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy().into_owned(),
        Value::UserData(data) => match data.borrow::<CommandHandle>() {
            Ok(handle) => format!("command<{}>", handle.result.name()),
            Err(_) => "<userdata>".to_string(),
        },
        other => format!("<{}>", other.type_name()),
    }
}
