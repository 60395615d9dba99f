use log::warn;

use crate::clock::SharedClock;
use crate::command::{Command, CommandCore};
use crate::timed::TimedCore;
use crate::world::{Camera, CameraRef, Entity, EntityRef, TargetRef, Vec2};

pub trait Tweenable: Copy {
    fn interpolate(from: Self, to: Self, alpha: f32) -> Self;
}

impl Tweenable for f32 {
    fn interpolate(from: Self, to: Self, alpha: f32) -> Self {
        from + (to - from) * alpha
    }
}

impl Tweenable for Vec2 {
    fn interpolate(from: Self, to: Self, alpha: f32) -> Self {
        from.lerp(to, alpha)
    }
}

/// Interpolates one property of a world object from its value at creation
/// to a target value. A graceful stop snaps to the target, a force stop
/// leaves the property where it is. Losing the target completes the tween.
pub struct Tween<T, V> {
    name: &'static str,
    core: CommandCore,
    timing: TimedCore,
    target: TargetRef<T>,
    from: V,
    to: V,
    access: fn(&mut T) -> &mut V,
}

pub type MoveEntity = Tween<Entity, Vec2>;
pub type FadeEntity = Tween<Entity, f32>;
pub type MoveCamera = Tween<Camera, Vec2>;

impl<T, V: Tweenable> Tween<T, V> {
    fn build(
        name: &'static str,
        clock: &SharedClock,
        target: TargetRef<T>,
        to: V,
        duration: u64,
        access: fn(&mut T) -> &mut V,
    ) -> Self {
        let from = target.with_mut(|object| *access(object)).unwrap_or_else(|| {
            warn!("{name}: target missing at creation; completing immediately");
            to
        });
        Tween {
            name,
            core: CommandCore::new(),
            timing: TimedCore::new(clock, duration),
            target,
            from,
            to,
            access,
        }
    }

    pub fn from_value(&self) -> V {
        self.from
    }

    pub fn to_value(&self) -> V {
        self.to
    }

    pub fn timing(&self) -> &TimedCore {
        &self.timing
    }
}

impl MoveEntity {
    pub fn new(clock: &SharedClock, target: EntityRef, to: Vec2, duration: u64) -> Self {
        Tween::build("move_entity", clock, target, to, duration, entity_position)
    }
}

impl FadeEntity {
    pub fn new(clock: &SharedClock, target: EntityRef, to: f32, duration: u64) -> Self {
        Tween::build("fade_entity", clock, target, to, duration, entity_opacity)
    }
}

impl MoveCamera {
    pub fn new(clock: &SharedClock, target: CameraRef, to: Vec2, duration: u64) -> Self {
        Tween::build("move_camera", clock, target, to, duration, camera_position)
    }
}

fn entity_position(entity: &mut Entity) -> &mut Vec2 {
    &mut entity.position
}

fn entity_opacity(entity: &mut Entity) -> &mut f32 {
    &mut entity.opacity
}

fn camera_position(camera: &mut Camera) -> &mut Vec2 {
    &mut camera.position
}

impl<T, V: Tweenable> Command for Tween<T, V> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn core(&self) -> &CommandCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CommandCore {
        &mut self.core
    }

    fn now(&self) -> u64 {
        self.timing.now()
    }

    fn execute_at(&mut self, tick: u64) {
        let complete = self.is_complete_at(tick);
        let Some(alpha) = self.timing.step(&mut self.core, complete, tick) else {
            return;
        };
        let value = V::interpolate(self.from, self.to, alpha);
        let access = self.access;
        if self
            .target
            .with_mut(|object| *access(object) = value)
            .is_none()
        {
            self.core.mark_finished();
        }
    }

    fn is_complete_at(&self, tick: u64) -> bool {
        self.core.is_stopped()
            || !self.target.is_alive()
            || self.timing.has_elapsed(&self.core, tick)
    }
}
