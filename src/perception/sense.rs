//! Sense channels and the capability set every scheduled sense implements

use serde::{Deserialize, Serialize};

use crate::core::types::{ListenerId, TargetId};
use crate::perception::listener::ListenerRegistry;
use crate::perception::target::TargetRegistry;
use crate::world::{PerceptionWorld, VisibilityTester};

/// Closed set of sense channels a listener can be configured with
///
/// Only sight is driven by a scheduler here. The other channels share the
/// same stimulus history and receive stimuli reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenseKind {
    Sight,
    Hearing,
    Damage,
    Touch,
}

impl SenseKind {
    pub const COUNT: usize = 4;

    pub const ALL: [SenseKind; SenseKind::COUNT] = [
        SenseKind::Sight,
        SenseKind::Hearing,
        SenseKind::Damage,
        SenseKind::Touch,
    ];

    /// Slot index in per-sense arrays
    pub fn index(self) -> usize {
        match self {
            SenseKind::Sight => 0,
            SenseKind::Hearing => 1,
            SenseKind::Damage => 2,
            SenseKind::Touch => 3,
        }
    }
}

/// Counters for one sense update pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SenseTickStats {
    /// Trace budget units charged
    pub traces: u32,
    /// Queries resolved this pass (age reset)
    pub processed: u32,
    /// Queries aged because the budget ran out
    pub skipped: u32,
    /// Queries resolved by the auto-success short-circuit
    pub auto_successes: u32,
    /// Queries deleted after the pass
    pub removed: u32,
    /// The wall-clock deadline was observed during the pass
    pub hit_time_limit: bool,
}

/// Mutable view of the shared registries handed to a sense
pub struct SenseContext<'a> {
    pub listeners: &'a mut ListenerRegistry,
    pub targets: &'a mut TargetRegistry,
    pub world: &'a dyn PerceptionWorld,
}

/// Capabilities of a scheduled sense
///
/// Listener and target registries are shared between senses; each sense
/// keeps its own per-pair bookkeeping and reacts to registry changes.
pub trait Sense {
    fn kind(&self) -> SenseKind;

    /// Generate work for a freshly registered listener
    fn on_new_listener(&mut self, ctx: &mut SenseContext<'_>, listener: ListenerId);

    /// Rebuild work after a listener's configuration changed
    fn on_listener_updated(&mut self, ctx: &mut SenseContext<'_>, listener: ListenerId);

    /// Drop all work for a listener that is about to be removed
    fn on_listener_removed(&mut self, ctx: &mut SenseContext<'_>, listener: ListenerId);

    /// Generate work for a freshly registered target
    fn on_new_target(&mut self, ctx: &mut SenseContext<'_>, target: TargetId);

    /// Drop all work for a target that is about to be removed
    fn on_target_removed(&mut self, ctx: &mut SenseContext<'_>, target: TargetId);

    /// Run one budgeted pass
    fn update(
        &mut self,
        ctx: &mut SenseContext<'_>,
        tester: &mut dyn VisibilityTester,
    ) -> SenseTickStats;
}
