//! Collaborators the perception core consumes from the surrounding world
//!
//! The perception core never owns entities. It holds [`EntityHandle`]s and
//! asks the world about them through [`PerceptionWorld`], and it delegates
//! the actual geometric visibility test to a [`VisibilityTester`].

pub mod sandbox;

use glam::Vec3;

use crate::core::types::{Attitude, EntityHandle, TeamId};

pub use sandbox::{Occluder, SandboxTester, SandboxWorld};

/// World location and facing of an entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub location: Vec3,
    /// Unit-length facing direction
    pub forward: Vec3,
}

impl Pose {
    pub fn new(location: Vec3, forward: Vec3) -> Self {
        Self {
            location,
            forward: forward.normalize_or_zero(),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            forward: Vec3::X,
        }
    }
}

/// Read-only view of the simulation world
pub trait PerceptionWorld {
    /// Does this handle still refer to the incarnation it was created for?
    fn is_alive(&self, handle: EntityHandle) -> bool;

    /// Current pose, or None if the entity is gone
    fn pose(&self, handle: EntityHandle) -> Option<Pose>;

    fn location(&self, handle: EntityHandle) -> Option<Vec3> {
        self.pose(handle).map(|pose| pose.location)
    }

    fn team(&self, handle: EntityHandle) -> TeamId;

    /// Affiliation predicate: how an observer of `observer_team` regards `target`
    fn attitude(&self, observer_team: TeamId, target: EntityHandle) -> Attitude {
        observer_team.attitude_towards(self.team(target))
    }
}

/// Result of one geometric visibility test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityOutcome {
    pub visible: bool,
    /// In [0, 1]
    pub strength: f32,
    pub seen_location: Vec3,
    /// Trace budget consumed; the scheduler charges at least one
    pub traces: u32,
}

impl VisibilityOutcome {
    pub fn seen(at: Vec3) -> Self {
        Self {
            visible: true,
            strength: 1.0,
            seen_location: at,
            traces: 1,
        }
    }

    pub fn blocked() -> Self {
        Self {
            visible: false,
            strength: 0.0,
            seen_location: Vec3::ZERO,
            traces: 1,
        }
    }
}

/// Synchronous line-of-sight test, idempotent for identical inputs within a tick
pub trait VisibilityTester {
    fn line_of_sight(
        &mut self,
        from: Vec3,
        to: Vec3,
        ignore: Option<EntityHandle>,
    ) -> VisibilityOutcome;

    /// Test for targets that provide their own "can be seen from" logic
    ///
    /// Defaults to a plain line of sight to the target's location.
    fn can_be_seen_from(
        &mut self,
        observer: Vec3,
        target: EntityHandle,
        target_location: Vec3,
        ignore: Option<EntityHandle>,
    ) -> VisibilityOutcome {
        let _ = target;
        self.line_of_sight(observer, target_location, ignore)
    }
}
