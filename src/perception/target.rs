//! Registry of entities that can be seen

use ahash::AHashMap;
use glam::Vec3;

use crate::core::types::{EntityHandle, TargetId};
use crate::world::PerceptionWorld;

#[derive(Debug, Clone)]
pub struct Target {
    pub id: TargetId,
    pub handle: EntityHandle,
    /// Visibility is decided by the target's own "can be seen from" test
    pub can_be_seen_from: bool,
    /// Location sampled once per tick
    pub location: Vec3,
}

impl Target {
    pub fn new(handle: EntityHandle, can_be_seen_from: bool, location: Vec3) -> Self {
        Self {
            id: handle.id,
            handle,
            can_be_seen_from,
            location,
        }
    }
}

#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: AHashMap<TargetId, Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a target, returning whatever was registered under its id before
    pub fn insert(&mut self, target: Target) -> Option<Target> {
        self.targets.insert(target.id, target)
    }

    pub fn remove(&mut self, id: TargetId) -> Option<Target> {
        self.targets.remove(&id)
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.targets.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Refresh cached locations; dead targets keep their last known location
    pub fn refresh_locations(&mut self, world: &dyn PerceptionWorld) {
        for target in self.targets.values_mut() {
            if let Some(location) = world.location(target.handle) {
                target.location = location;
            }
        }
    }

    /// Targets whose weak reference no longer resolves
    pub fn invalid_targets(&self, world: &dyn PerceptionWorld) -> Vec<TargetId> {
        self.targets
            .values()
            .filter(|target| !world.is_alive(target.handle))
            .map(|target| target.id)
            .collect()
    }

    /// Release storage left over by removals
    pub fn compact(&mut self) {
        self.targets.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TeamId;
    use crate::world::SandboxWorld;

    #[test]
    fn test_invalid_targets_found() {
        let mut world = SandboxWorld::new();
        let a = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));
        let b = world.spawn(2, Vec3::ZERO, Vec3::X, TeamId(1));

        let mut registry = TargetRegistry::new();
        registry.insert(Target::new(a, false, Vec3::ZERO));
        registry.insert(Target::new(b, false, Vec3::ZERO));

        world.despawn(b);
        assert_eq!(registry.invalid_targets(&world), vec![b.id]);
    }

    #[test]
    fn test_refresh_locations() {
        let mut world = SandboxWorld::new();
        let a = world.spawn(1, Vec3::ZERO, Vec3::X, TeamId(1));

        let mut registry = TargetRegistry::new();
        registry.insert(Target::new(a, false, Vec3::ZERO));

        world.set_location(a, Vec3::new(3.0, 4.0, 0.0));
        registry.refresh_locations(&world);
        assert_eq!(registry.get(a.id).unwrap().location, Vec3::new(3.0, 4.0, 0.0));

        world.despawn(a);
        world.set_location(a, Vec3::ZERO);
        registry.refresh_locations(&world);
        assert_eq!(registry.get(a.id).unwrap().location, Vec3::new(3.0, 4.0, 0.0));
    }
}
