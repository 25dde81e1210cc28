//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a world entity.
///
/// The world may hand the same stable id to a new entity once the previous
/// owner is gone, so on its own it is not enough to tell two incarnations
/// apart. Pair it with a generation in [`EntityHandle`] for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StableId(pub u32);

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Weak reference to a world entity: stable id plus incarnation.
///
/// Never owns the entity. Whether it still points at a live entity is a
/// question for [`crate::world::PerceptionWorld::is_alive`], asked on every
/// dereference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityHandle {
    pub id: StableId,
    pub generation: u32,
}

impl EntityHandle {
    pub fn new(id: u32, generation: u32) -> Self {
        Self {
            id: StableId(id),
            generation,
        }
    }

    /// True if both handles name the same stable id but different incarnations
    pub fn is_recycled_from(&self, other: &EntityHandle) -> bool {
        self.id == other.id && self.generation != other.generation
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.generation)
    }
}

/// Listeners are keyed by the stable id of the entity doing the perceiving
pub type ListenerId = StableId;

/// Targets are keyed by the stable id of the entity being perceived
pub type TargetId = StableId;

/// Team an entity belongs to, used by the affiliation filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u8);

impl TeamId {
    /// Entities without a team are neutral to everyone
    pub const NO_TEAM: TeamId = TeamId(u8::MAX);

    /// Default attitude between two teams
    pub fn attitude_towards(&self, other: TeamId) -> Attitude {
        if *self == TeamId::NO_TEAM || other == TeamId::NO_TEAM {
            Attitude::Neutral
        } else if *self == other {
            Attitude::Friendly
        } else {
            Attitude::Hostile
        }
    }
}

impl Default for TeamId {
    fn default() -> Self {
        Self::NO_TEAM
    }
}

/// How an observer regards a candidate target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attitude {
    Friendly,
    Neutral,
    Hostile,
}
