//! Concrete gameplay commands registered through the scripting interface.

mod dialog;
mod tween;
mod wait;

pub use dialog::{ShowDialog, DEFAULT_HOLD_MS, DEFAULT_MS_PER_CHAR};
pub use tween::{FadeEntity, MoveCamera, MoveEntity, Tween, Tweenable};
pub use wait::Wait;
