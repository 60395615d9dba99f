use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use log::{debug, info};
use mlua::{Lua, LuaOptions, StdLib};
use serde::Serialize;
use stagehand_script::{
    ContextTag, EventLog, ManualClock, PauseLabel, PauseRequest, PauseRequests, ScriptContext,
    ScriptError, ScriptEvent, ScriptingInterface, SharedClock, TickSource, Vec2, World,
    WorldSnapshot,
};

use crate::cli::EngineConfig;

/// A script fault recorded against the context it happened in.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptFailure {
    pub frame: u64,
    pub context: ContextTag,
    pub label: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub ticks: u64,
    pub window_ticks: u64,
    pub paused: bool,
    pub map: Option<String>,
    pub world: WorldSnapshot,
    pub events: Vec<ScriptEvent>,
    pub pause_requests: Vec<PauseRequest>,
    pub failures: Vec<ScriptFailure>,
}

/// Host owning the Lua state and one scripting interface per context.
pub struct Engine {
    lua: Lua,
    clock: Rc<ManualClock>,
    world: World,
    events: EventLog,
    pauses: PauseRequests,
    global: ScriptingInterface,
    pause_menu: ScriptingInterface,
    map: Option<ScriptingInterface>,
    map_name: Option<String>,
    tick_ms: u64,
    frame: u64,
    paused: bool,
    failures: Vec<ScriptFailure>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .context("creating Lua state")?;
        let clock = ManualClock::shared();
        let world = World::new();
        let events = EventLog::new();
        let pauses = PauseRequests::new();

        let global = create_interface(&lua, ContextTag::Global, &clock, &world, &events, &pauses)?;
        let pause_menu =
            create_interface(&lua, ContextTag::PauseMenu, &clock, &world, &events, &pauses)?;

        Ok(Engine {
            lua,
            clock,
            world,
            events,
            pauses,
            global,
            pause_menu,
            map: None,
            map_name: None,
            tick_ms: config.tick_ms,
            frame: 0,
            paused: false,
            failures: Vec::new(),
        })
    }

    pub fn interface(&self, tag: ContextTag) -> Option<&ScriptingInterface> {
        match tag {
            ContextTag::Map => self.map.as_ref(),
            ContextTag::Global => Some(&self.global),
            ContextTag::PauseMenu => Some(&self.pause_menu),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn failures(&self) -> &[ScriptFailure] {
        &self.failures
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Replaces the map context. The previous map's cothreads and commands
    /// are dropped and the camera returns to the origin.
    pub fn load_map(&mut self, name: &str, script: Option<&Path>) -> Result<()> {
        if let Some(previous) = self.map.take() {
            for fault in previous.take_faults() {
                self.record_failure(ContextTag::Map, fault);
            }
            previous
                .shutdown(&self.lua)
                .context("tearing down previous map context")?;
            if let Some(previous_name) = self.map_name.take() {
                info!("map.unload {previous_name}");
            }
        }
        self.world.reset_camera(Vec2::default());

        let map = create_interface(
            &self.lua,
            ContextTag::Map,
            &self.clock,
            &self.world,
            &self.events,
            &self.pauses,
        )?;
        if self.paused {
            map.pause();
        }
        self.map = Some(map);
        self.map_name = Some(name.to_string());
        info!("map.load {name}");
        self.events
            .record(self.clock.ticks(), ContextTag::Map, format!("map.load {name}"));

        if let Some(script) = script {
            self.schedule_file(ContextTag::Map, script)?;
        }
        Ok(())
    }

    pub fn schedule_file(&mut self, tag: ContextTag, path: &Path) -> Result<()> {
        let outcome = self
            .interface(tag)
            .with_context(|| format!("no {tag} context is loaded"))?
            .schedule_file(&self.lua, path);
        self.absorb(tag, outcome)
            .with_context(|| format!("starting {} in {tag}", path.display()))
    }

    pub fn schedule_code(&mut self, tag: ContextTag, name: &str, code: &str) -> Result<()> {
        let outcome = self
            .interface(tag)
            .with_context(|| format!("no {tag} context is loaded"))?
            .schedule_code(&self.lua, name, code);
        self.absorb(tag, outcome)
            .with_context(|| format!("starting {name} in {tag}"))
    }

    /// Advances the clock by one step and services the active contexts.
    pub fn tick(&mut self) {
        self.clock.advance(self.tick_ms);
        self.frame += 1;
        let order: &[ContextTag] = if self.paused {
            &[ContextTag::PauseMenu]
        } else {
            &[ContextTag::Map, ContextTag::Global]
        };
        for tag in order {
            self.step_context(*tag);
        }
        self.collect_faults();
        self.apply_pause_requests();
    }

    /// Freezes game ticks and suspends the map and global schedulers.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        self.clock.set_paused(paused);
        for interface in [Some(&self.global), self.map.as_ref()].into_iter().flatten() {
            if paused {
                interface.pause();
            } else {
                interface.resume();
            }
        }
        let label = if paused { "game.pause" } else { "game.resume" };
        info!("{label} at frame {}", self.frame);
    }

    /// Selects `index` on every open choice dialog. Returns how many dialogs
    /// accepted the selection.
    pub fn auto_choose(&self, index: usize) -> usize {
        let mut selected = 0;
        for tag in [ContextTag::Map, ContextTag::Global, ContextTag::PauseMenu] {
            let Some(interface) = self.interface(tag) else {
                continue;
            };
            for choice in interface.active_choices() {
                match choice.select_choice(index) {
                    Ok(()) => {
                        debug!("dialog.choose {index} [{tag}]");
                        selected += 1;
                    }
                    Err(err) => debug!("dialog.choose skipped [{tag}]: {err}"),
                }
            }
        }
        selected
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            frames: self.frame,
            ticks: self.clock.ticks(),
            window_ticks: self.clock.window_ticks(),
            paused: self.paused,
            map: self.map_name.clone(),
            world: self.world.snapshot(),
            events: self.events.snapshot(),
            pause_requests: self.pauses.history(),
            failures: self.failures.clone(),
        }
    }

    fn step_context(&mut self, tag: ContextTag) {
        let outcome = match self.interface(tag) {
            Some(interface) => {
                interface.execute_commands();
                interface.update(&self.lua)
            }
            None => return,
        };
        if let Err(err) = outcome {
            self.record_failure(tag, err);
        }
    }

    /// Records faults the interfaces could not return directly, such as a
    /// `start_script` child dying on its first run.
    fn collect_faults(&mut self) {
        for tag in [ContextTag::Map, ContextTag::Global, ContextTag::PauseMenu] {
            let faults = match self.interface(tag) {
                Some(interface) => interface.take_faults(),
                None => continue,
            };
            for fault in faults {
                self.record_failure(tag, fault);
            }
        }
    }

    fn apply_pause_requests(&mut self) {
        for request in self.pauses.drain() {
            debug!(
                "pause request {} from {}",
                request.label.as_str(),
                request.context
            );
            self.set_paused(request.label == PauseLabel::Pause);
        }
    }

    /// Script faults are recorded and swallowed; anything else is returned.
    fn absorb<T>(&mut self, tag: ContextTag, outcome: Result<T, ScriptError>) -> Result<()> {
        self.collect_faults();
        match outcome {
            Ok(_) => Ok(()),
            Err(err @ ScriptError::Script { .. }) => {
                self.record_failure(tag, err);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn record_failure(&mut self, tag: ContextTag, err: ScriptError) {
        let (label, message) = match &err {
            ScriptError::Script { label, source, .. } => (Some(label.clone()), source.to_string()),
            other => (None, other.to_string()),
        };
        let context = err.context().unwrap_or(tag);
        debug!("failure recorded for [{context}] at frame {}", self.frame);
        self.failures.push(ScriptFailure {
            frame: self.frame,
            context,
            label,
            message,
        });
    }
}

fn create_interface(
    lua: &Lua,
    tag: ContextTag,
    clock: &Rc<ManualClock>,
    world: &World,
    events: &EventLog,
    pauses: &PauseRequests,
) -> Result<ScriptingInterface> {
    let shared: SharedClock = clock.clone();
    let context = ScriptContext::new(tag, shared, world.clone(), events.clone(), pauses.clone());
    ScriptingInterface::new(lua, context)
        .with_context(|| format!("creating {tag} scripting interface"))
}

#[cfg(test)]
mod tests {
    use stagehand_script::ContextTag;

    use super::Engine;
    use crate::cli::EngineConfig;

    fn engine() -> Engine {
        Engine::new(&EngineConfig::default()).expect("engine")
    }

    #[test]
    fn pause_freezes_map_and_runs_pause_menu() -> anyhow::Result<()> {
        let mut engine = engine();
        engine.load_map("dock", None)?;
        engine.schedule_code(
            ContextTag::Map,
            "map_loop",
            "while true do wait(); map_steps = (map_steps or 0) + 1 end",
        )?;
        engine.schedule_code(
            ContextTag::PauseMenu,
            "menu_loop",
            "while true do wait(); menu_steps = (menu_steps or 0) + 1 end",
        )?;

        engine.tick();
        engine.set_paused(true);
        engine.tick();
        engine.tick();
        engine.set_paused(false);
        engine.tick();

        let map_env = engine
            .interface(ContextTag::Map)
            .expect("map loaded")
            .environment(&engine.lua)?;
        let menu_env = engine
            .interface(ContextTag::PauseMenu)
            .expect("pause menu")
            .environment(&engine.lua)?;
        assert_eq!(map_env.get::<_, u32>("map_steps")?, 2);
        assert_eq!(menu_env.get::<_, u32>("menu_steps")?, 2);
        Ok(())
    }

    #[test]
    fn script_pause_requests_apply_after_the_tick() -> anyhow::Result<()> {
        let mut engine = engine();
        engine.schedule_code(
            ContextTag::Global,
            "pauser",
            "wait(); game_pauser:pause()",
        )?;
        engine.schedule_code(
            ContextTag::PauseMenu,
            "unpauser",
            "wait(function() return game_paused() end); game_pauser.resume()",
        )?;
        engine.tick();
        assert!(engine.is_paused());
        engine.tick();
        assert!(!engine.is_paused());
        assert_eq!(engine.summary().pause_requests.len(), 2);
        Ok(())
    }

    #[test]
    fn failing_context_does_not_stop_the_others() -> anyhow::Result<()> {
        let mut engine = engine();
        engine.load_map("cellar", None)?;
        engine.schedule_code(ContextTag::Map, "broken", "wait(); error('trapdoor jammed')")?;
        engine.schedule_code(ContextTag::Global, "clock", "wait(); log('global ran')")?;
        engine.tick();

        let failures = engine.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].context, ContextTag::Map);
        assert_eq!(failures[0].label.as_deref(), Some("broken"));
        assert!(failures[0].message.contains("trapdoor jammed"));
        assert!(engine.events().messages().contains(&"global ran".to_string()));
        Ok(())
    }

    #[test]
    fn child_script_faults_are_recorded() -> anyhow::Result<()> {
        let mut engine = engine();
        engine.schedule_code(
            ContextTag::Global,
            "parent",
            r#"
            wait()
            local id = start_script(function() error('child exploded') end)
            log('parent got ' .. tostring(id))
            "#,
        )?;
        engine.tick();
        engine.tick();

        let failures = engine.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].frame, 1);
        assert_eq!(failures[0].context, ContextTag::Global);
        assert!(failures[0].message.contains("child exploded"));
        assert!(engine
            .events()
            .messages()
            .contains(&"parent got nil".to_string()));
        Ok(())
    }

    #[test]
    fn load_map_replaces_the_previous_context() -> anyhow::Result<()> {
        let mut engine = engine();
        engine.load_map("first", None)?;
        engine.schedule_code(ContextTag::Map, "old", "move_camera(100, 0, 1000); wait(); log('old map')")?;
        engine.load_map("second", None)?;
        engine.tick();
        engine.tick();

        assert!(!engine.events().messages().contains(&"old map".to_string()));
        assert_eq!(engine.world().snapshot().camera.position.x, 0.0);
        assert_eq!(engine.summary().map.as_deref(), Some("second"));
        Ok(())
    }

    #[test]
    fn auto_choose_answers_open_dialogs() -> anyhow::Result<()> {
        let mut engine = engine();
        engine.schedule_code(
            ContextTag::Global,
            "question",
            r#"
            local answer = show_dialog("Stay or go?", { "stay", "go" })
            wait(answer)
            log("picked " .. answer:choice_index())
            "#,
        )?;
        engine.tick();
        assert_eq!(engine.auto_choose(1), 1);
        engine.tick();
        assert!(engine.events().messages().contains(&"picked 1".to_string()));
        Ok(())
    }
}
