//! Notifications produced while applying stimuli and forgetting entities

use serde::Serialize;

use crate::core::types::{EntityHandle, ListenerId};
use crate::perception::sense::SenseKind;
use crate::perception::stimulus::Stimulus;

/// Everything a listener's owner may want to react to
///
/// Events are appended in the order they happen. A `TargetForgotten` always
/// precedes the removal it announces, and `PerceptionUpdated` closes each
/// batch of `TargetPerceptionUpdated` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PerceptionEvent {
    /// One stimulus about one entity was applied
    TargetPerceptionUpdated {
        listener: ListenerId,
        target: EntityHandle,
        stimulus: Stimulus,
    },
    /// All entities touched by one apply pass
    PerceptionUpdated {
        listener: ListenerId,
        targets: Vec<EntityHandle>,
    },
    /// A stored stimulus aged out
    StimulusExpired {
        listener: ListenerId,
        target: EntityHandle,
        sense: SenseKind,
    },
    /// The entity is about to be removed from memory
    TargetForgotten {
        listener: ListenerId,
        target: EntityHandle,
    },
    /// The whole memory is about to be cleared
    AllTargetsForgotten { listener: ListenerId },
}

impl PerceptionEvent {
    pub fn listener(&self) -> ListenerId {
        match self {
            PerceptionEvent::TargetPerceptionUpdated { listener, .. }
            | PerceptionEvent::PerceptionUpdated { listener, .. }
            | PerceptionEvent::StimulusExpired { listener, .. }
            | PerceptionEvent::TargetForgotten { listener, .. }
            | PerceptionEvent::AllTargetsForgotten { listener } => *listener,
        }
    }
}
