//! Scheduling record for one (listener, target) sight relationship

use std::cmp::Reverse;

use glam::Vec3;
use ordered_float::OrderedFloat;

use crate::core::config::SightSchedulerConfig;
use crate::core::types::{Attitude, ListenerId, TargetId};
use crate::perception::digest::DigestedSightProperties;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SightQuery {
    pub observer: ListenerId,
    pub target: TargetId,
    /// Where the target was when last confirmed visible by a trace
    pub last_seen_location: Option<Vec3>,
    /// Visible as of the last time this query was processed
    pub last_result: bool,
    /// Consecutive updates this query was skipped for lack of budget
    pub age: u32,
    pub importance: f32,
    /// Observer's attitude towards the target, cached at generation
    pub attitude: Attitude,
}

impl SightQuery {
    pub fn new(observer: ListenerId, target: TargetId, attitude: Attitude, importance: f32) -> Self {
        Self {
            observer,
            target,
            last_seen_location: None,
            last_result: false,
            age: 0,
            importance,
            attitude,
        }
    }

    /// Sort key: higher importance first, then longer starved first
    pub fn priority(&self) -> (Reverse<OrderedFloat<f32>>, Reverse<u32>) {
        (Reverse(OrderedFloat(self.importance)), Reverse(self.age))
    }
}

/// Distance-based scheduling priority of a pair
///
/// Full importance within the high-importance distance, then falling
/// linearly to the floor at the listener's sight radius.
pub fn query_importance(
    observer: Vec3,
    target: Vec3,
    sight: &DigestedSightProperties,
    config: &SightSchedulerConfig,
) -> f32 {
    let max = config.max_query_importance;
    let floor = config.sight_limit_query_importance.min(max);

    let dist_sq = observer.distance_squared(target);
    if dist_sq <= config.high_importance_distance_sq() {
        return max;
    }

    let span = sight.sight_radius - config.high_importance_distance;
    if span <= 0.0 {
        return floor;
    }

    let t = ((dist_sq.sqrt() - config.high_importance_distance) / span).clamp(0.0, 1.0);
    (max + (floor - max) * t).clamp(floor, max)
}
