//! Cooperative scheduling for Lua gameplay scripts and the deferred,
//! time-based commands they drive.

pub mod bindings;
pub mod clock;
pub mod command;
pub mod commands;
pub mod cothread;
pub mod error;
pub mod events;
pub mod interface;
pub mod pause;
pub mod result;
pub mod scheduler;
pub mod task;
pub mod timed;
pub mod world;

pub use bindings::CommandHandle;
pub use clock::{ClockSource, ManualClock, SharedClock, TickSource};
pub use command::{ChoiceCommand, Command, CommandCore, CommandState, SharedCommand};
pub use cothread::{ContextTag, Cothread, CothreadId};
pub use error::{Result, ScriptError};
pub use events::{EventLog, ScriptEvent};
pub use interface::{ScriptContext, ScriptingInterface};
pub use pause::{PauseLabel, PauseRequest, PauseRequests};
pub use result::{ChoiceResult, CommandResult};
pub use scheduler::{Scheduler, ScriptSource};
pub use task::{LuaPredicate, NextTick, Predicate, SchedulerTask};
pub use timed::TimedCore;
pub use world::{Camera, CameraRef, Entity, EntityRef, TargetRef, Vec2, World, WorldSnapshot};
