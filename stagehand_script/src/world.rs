use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::Serialize;

#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    pub fn lerp(self, target: Vec2, alpha: f32) -> Vec2 {
        Vec2 {
            x: self.x + (target.x - self.x) * alpha,
            y: self.y + (target.y - self.y) * alpha,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub name: String,
    pub position: Vec2,
    pub opacity: f32,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Camera {
    pub position: Vec2,
}

/// Validity-checked reference held by long-lived commands. Once the target is
/// removed from the world every access returns `None`.
#[derive(Debug, Clone)]
pub struct TargetRef<T> {
    inner: Weak<RefCell<T>>,
}

impl<T> TargetRef<T> {
    pub fn dangling() -> Self {
        TargetRef { inner: Weak::new() }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let target = self.inner.upgrade()?;
        let borrowed = target.borrow();
        Some(f(&borrowed))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let target = self.inner.upgrade()?;
        let mut borrowed = target.borrow_mut();
        Some(f(&mut borrowed))
    }
}

pub type EntityRef = TargetRef<Entity>;
pub type CameraRef = TargetRef<Camera>;

#[derive(Debug, Default)]
struct WorldState {
    entities: BTreeMap<String, Rc<RefCell<Entity>>>,
    camera: Rc<RefCell<Camera>>,
}

/// Minimal stand-in for the game objects commands mutate: named entities and
/// a camera. Cloning yields another handle onto the same world.
#[derive(Debug, Clone, Default)]
pub struct World {
    inner: Rc<RefCell<WorldState>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorldSnapshot {
    pub camera: Camera,
    pub entities: Vec<Entity>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns (or replaces) an entity. Commands bound to a replaced entity
    /// lose their target.
    pub fn spawn(&self, name: &str, position: Vec2) -> EntityRef {
        let entity = Rc::new(RefCell::new(Entity {
            name: name.to_string(),
            position,
            opacity: 1.0,
        }));
        let target = TargetRef {
            inner: Rc::downgrade(&entity),
        };
        self.inner
            .borrow_mut()
            .entities
            .insert(name.to_string(), entity);
        target
    }

    pub fn despawn(&self, name: &str) -> bool {
        self.inner.borrow_mut().entities.remove(name).is_some()
    }

    pub fn entity(&self, name: &str) -> Option<EntityRef> {
        self.inner
            .borrow()
            .entities
            .get(name)
            .map(|entity| TargetRef {
                inner: Rc::downgrade(entity),
            })
    }

    pub fn camera(&self) -> CameraRef {
        TargetRef {
            inner: Rc::downgrade(&self.inner.borrow().camera),
        }
    }

    /// Installs a fresh camera, invalidating commands still driving the old
    /// one.
    pub fn reset_camera(&self, position: Vec2) {
        self.inner.borrow_mut().camera = Rc::new(RefCell::new(Camera { position }));
    }

    pub fn entity_count(&self) -> usize {
        self.inner.borrow().entities.len()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let state = self.inner.borrow();
        let camera = state.camera.borrow().clone();
        let entities = state
            .entities
            .values()
            .map(|entity| entity.borrow().clone())
            .collect();
        WorldSnapshot { camera, entities }
    }
}

#[cfg(test)]
mod tests {
    use super::{Vec2, World};

    #[test]
    fn despawn_invalidates_outstanding_refs() {
        let world = World::new();
        let target = world.spawn("crate", Vec2::new(1.0, 2.0));
        assert_eq!(target.with(|e| e.position), Some(Vec2::new(1.0, 2.0)));
        assert!(world.despawn("crate"));
        assert!(!target.is_alive());
        assert!(target.with_mut(|e| e.opacity = 0.0).is_none());
        assert!(!world.despawn("crate"));
    }

    #[test]
    fn camera_reset_drops_previous_camera() {
        let world = World::new();
        let camera = world.camera();
        assert!(camera.is_alive());
        world.reset_camera(Vec2::new(4.0, 0.0));
        assert!(!camera.is_alive());
        assert_eq!(world.snapshot().camera.position, Vec2::new(4.0, 0.0));
    }

    #[test]
    fn snapshot_copies_camera_and_entities() {
        let world = World::new();
        world.spawn("crate", Vec2::new(3.0, 4.0));
        world.spawn("gull", Vec2::new(-1.0, 9.0));
        world.camera().with_mut(|camera| camera.position = Vec2::new(7.0, 0.0));

        let snapshot = world.snapshot();
        world.despawn("gull");
        assert_eq!(snapshot.camera.position, Vec2::new(7.0, 0.0));
        let names: Vec<&str> = snapshot.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"crate") && names.contains(&"gull"));
        assert_eq!(world.snapshot().entities.len(), 1);
    }
}
