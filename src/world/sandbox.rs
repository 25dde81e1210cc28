//! In-memory world and sphere-occluder line-of-sight tester
//!
//! Small enough to reason about in tests, big enough to drive the stress
//! runner and benchmarks with thousands of entities.

use ahash::AHashMap;
use glam::Vec3;

use super::{PerceptionWorld, Pose, VisibilityOutcome, VisibilityTester};
use crate::core::types::{EntityHandle, StableId, TeamId};

#[derive(Debug, Clone)]
struct SandboxEntity {
    generation: u32,
    pose: Pose,
    team: TeamId,
    alive: bool,
}

/// Entity table keyed by stable id, with generation counters for recycling
#[derive(Debug, Clone, Default)]
pub struct SandboxWorld {
    entities: AHashMap<StableId, SandboxEntity>,
}

impl SandboxWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an entity under `id`; reusing a dead id bumps its generation
    pub fn spawn(&mut self, id: u32, location: Vec3, forward: Vec3, team: TeamId) -> EntityHandle {
        let key = StableId(id);
        let generation = self
            .entities
            .get(&key)
            .map(|previous| previous.generation + 1)
            .unwrap_or(0);

        self.entities.insert(
            key,
            SandboxEntity {
                generation,
                pose: Pose::new(location, forward),
                team,
                alive: true,
            },
        );

        EntityHandle { id: key, generation }
    }

    /// Kill the entity; its handle stops resolving but the id stays reserved
    pub fn despawn(&mut self, handle: EntityHandle) {
        if let Some(entity) = self.entity_mut(handle) {
            entity.alive = false;
        }
    }

    pub fn set_location(&mut self, handle: EntityHandle, location: Vec3) {
        if let Some(entity) = self.entity_mut(handle) {
            entity.pose.location = location;
        }
    }

    pub fn set_forward(&mut self, handle: EntityHandle, forward: Vec3) {
        if let Some(entity) = self.entity_mut(handle) {
            entity.pose.forward = forward.normalize_or_zero();
        }
    }

    pub fn len(&self) -> usize {
        self.entities.values().filter(|e| e.alive).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entity(&self, handle: EntityHandle) -> Option<&SandboxEntity> {
        self.entities
            .get(&handle.id)
            .filter(|e| e.alive && e.generation == handle.generation)
    }

    fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut SandboxEntity> {
        self.entities
            .get_mut(&handle.id)
            .filter(|e| e.alive && e.generation == handle.generation)
    }
}

impl PerceptionWorld for SandboxWorld {
    fn is_alive(&self, handle: EntityHandle) -> bool {
        self.entity(handle).is_some()
    }

    fn pose(&self, handle: EntityHandle) -> Option<Pose> {
        self.entity(handle).map(|e| e.pose)
    }

    fn team(&self, handle: EntityHandle) -> TeamId {
        self.entity(handle).map(|e| e.team).unwrap_or(TeamId::NO_TEAM)
    }
}

/// Spherical obstacle blocking line of sight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occluder {
    pub center: Vec3,
    pub radius: f32,
}

impl Occluder {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Does the segment from `a` to `b` pass through this sphere?
    pub fn blocks(&self, a: Vec3, b: Vec3) -> bool {
        let ab = b - a;
        let len_sq = ab.length_squared();
        let t = if len_sq > f32::EPSILON {
            ((self.center - a).dot(ab) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = a + ab * t;
        closest.distance_squared(self.center) < self.radius * self.radius
    }
}

/// Line-of-sight tester over a set of sphere occluders, counting every call
#[derive(Debug, Clone, Default)]
pub struct SandboxTester {
    pub occluders: Vec<Occluder>,
    /// Number of geometric tests performed so far
    pub calls: usize,
}

impl SandboxTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_occluders(occluders: Vec<Occluder>) -> Self {
        Self {
            occluders,
            calls: 0,
        }
    }
}

impl VisibilityTester for SandboxTester {
    fn line_of_sight(
        &mut self,
        from: Vec3,
        to: Vec3,
        _ignore: Option<EntityHandle>,
    ) -> VisibilityOutcome {
        self.calls += 1;

        if self.occluders.iter().any(|o| o.blocks(from, to)) {
            VisibilityOutcome::blocked()
        } else {
            VisibilityOutcome::seen(to)
        }
    }
}
