//! Budgeted sight query scheduler
//!
//! Every eligible (listener, target) pair owns one [`SightQuery`] in a single
//! flat list sorted by importance, then by how long it has been starved. Each
//! update walks the list from the front until the trace budget or the time
//! slice runs out; everything behind that point is aged so it climbs the
//! list and gets its turn within a bounded number of updates.

use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use glam::Vec3;

use super::query::{query_importance, SightQuery};
use crate::core::config::SightSchedulerConfig;
use crate::core::types::{Attitude, EntityHandle, ListenerId, TargetId};
use crate::perception::digest::DigestedSightProperties;
use crate::perception::listener::{Listener, ListenerRegistry};
use crate::perception::sense::{Sense, SenseContext, SenseKind, SenseTickStats};
use crate::perception::stimulus::Stimulus;
use crate::perception::target::{Target, TargetRegistry};
use crate::world::{PerceptionWorld, VisibilityTester};

/// Visibility state carried across a listener reconfiguration
#[derive(Debug, Clone, Copy)]
struct CarriedResult {
    visible: bool,
    last_seen_location: Option<Vec3>,
}

impl From<&SightQuery> for CarriedResult {
    fn from(query: &SightQuery) -> Self {
        Self {
            visible: query.last_result,
            last_seen_location: query.last_seen_location,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SightScheduler {
    config: SightSchedulerConfig,
    queries: Vec<SightQuery>,
    /// Mirrors `queries` for the at-most-one-query-per-pair check
    pairs: AHashSet<(ListenerId, TargetId)>,
}

impl SightScheduler {
    pub fn new(config: SightSchedulerConfig) -> Self {
        Self {
            config,
            queries: Vec::new(),
            pairs: AHashSet::new(),
        }
    }

    pub fn config(&self) -> &SightSchedulerConfig {
        &self.config
    }

    /// Queries in processing order
    pub fn queries(&self) -> &[SightQuery] {
        &self.queries
    }

    pub fn query(&self, observer: ListenerId, target: TargetId) -> Option<&SightQuery> {
        if !self.pairs.contains(&(observer, target)) {
            return None;
        }
        self.queries
            .iter()
            .find(|q| q.observer == observer && q.target == target)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Listeners currently seeing `target`
    pub fn observers_of(&self, target: TargetId) -> impl Iterator<Item = ListenerId> + '_ {
        self.queries
            .iter()
            .filter(move |q| q.target == target && q.last_result)
            .map(|q| q.observer)
    }

    fn sort_queries(&mut self) {
        self.queries.sort_by_key(SightQuery::priority);
    }

    /// Attitude of the pair if the listener's sight should track this target
    fn eligible_attitude(
        listener: &Listener,
        sight: &DigestedSightProperties,
        target: &Target,
        world: &dyn PerceptionWorld,
    ) -> Option<Attitude> {
        if listener.id == target.id {
            return None;
        }
        let attitude = world.attitude(listener.team, target.handle);
        sight.affiliation.allows(attitude).then_some(attitude)
    }

    fn add_query(
        &mut self,
        listener: &Listener,
        sight: &DigestedSightProperties,
        target: &Target,
        attitude: Attitude,
        carried: Option<CarriedResult>,
    ) -> bool {
        if !self.pairs.insert((listener.id, target.id)) {
            return false;
        }

        let importance = query_importance(listener.pose.location, target.location, sight, &self.config);
        let mut query = SightQuery::new(listener.id, target.id, attitude, importance);
        if let Some(carried) = carried {
            query.last_result = carried.visible;
            query.last_seen_location = carried.last_seen_location;
        }
        self.queries.push(query);
        true
    }

    fn generate_for_listener(
        &mut self,
        listener: &Listener,
        targets: &TargetRegistry,
        world: &dyn PerceptionWorld,
        carried: &AHashMap<TargetId, CarriedResult>,
    ) -> usize {
        let Some(sight) = listener.sight().copied() else {
            return 0;
        };

        let mut added = 0;
        for target in targets.iter() {
            if let Some(attitude) = Self::eligible_attitude(listener, &sight, target, world) {
                if self.add_query(listener, &sight, target, attitude, carried.get(&target.id).copied()) {
                    added += 1;
                }
            }
        }
        added
    }

    fn generate_for_target(
        &mut self,
        target: &Target,
        listeners: &ListenerRegistry,
        world: &dyn PerceptionWorld,
    ) -> usize {
        let mut added = 0;
        for listener in listeners.iter() {
            let Some(sight) = listener.sight().copied() else {
                continue;
            };
            // Dead listeners wait for the sweep; their queries would only be flagged next update
            if !world.is_alive(listener.handle) {
                continue;
            }
            if let Some(attitude) = Self::eligible_attitude(listener, &sight, target, world) {
                if self.add_query(listener, &sight, target, attitude, None) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Remove every query matching `predicate`, telling listeners that saw
    /// the target they no longer do
    fn retire(
        &mut self,
        predicate: impl Fn(&SightQuery) -> bool,
        listeners: &mut ListenerRegistry,
        targets: &TargetRegistry,
    ) -> usize {
        let mut retired = Vec::new();
        self.queries.retain(|q| {
            if predicate(q) {
                retired.push(*q);
                false
            } else {
                true
            }
        });

        for query in &retired {
            self.pairs.remove(&(query.observer, query.target));
            if query.last_result {
                emit_lost(query, listeners, targets);
            }
        }
        retired.len()
    }

    /// One budgeted pass over the query list
    pub fn run_update(
        &mut self,
        listeners: &mut ListenerRegistry,
        targets: &mut TargetRegistry,
        world: &dyn PerceptionWorld,
        tester: &mut dyn VisibilityTester,
    ) -> SenseTickStats {
        let started = Instant::now();
        let deadline = started + self.config.max_time_slice();
        let check_every = self.config.min_queries_per_time_slice_check.max(1);
        let max_traces = self.config.max_traces_per_tick;

        for listener in listeners.iter_mut() {
            if listener.sight().is_some() {
                listener.refresh_pose(world);
            }
        }
        targets.refresh_locations(world);

        let mut stats = SenseTickStats::default();
        let mut flagged: Vec<usize> = Vec::new();
        let mut dead_targets: Vec<TargetId> = Vec::new();

        for (index, query) in self.queries.iter_mut().enumerate() {
            let (Some(listener), Some(target)) =
                (listeners.get_mut(query.observer), targets.get(query.target))
            else {
                report_missing_endpoint(query);
                query.last_result = false;
                flagged.push(index);
                continue;
            };
            let Some(sight) = listener.sight().copied() else {
                report_missing_endpoint(query);
                query.last_result = false;
                flagged.push(index);
                continue;
            };

            if stats.hit_time_limit || stats.traces >= max_traces {
                query.age = query.age.saturating_add(1);
                query.importance =
                    query_importance(listener.pose.location, target.location, &sight, &self.config);
                stats.skipped += 1;
                continue;
            }

            if !world.is_alive(target.handle) {
                flagged.push(index);
                if !dead_targets.contains(&target.id) {
                    dead_targets.push(target.id);
                }
                continue;
            }
            if !world.is_alive(listener.handle) {
                flagged.push(index);
                continue;
            }

            let observer = listener.pose;
            let target_location = target.location;

            let auto_success = match (sight.auto_success_range_sq, query.last_seen_location) {
                (Some(range_sq), Some(last_seen)) => {
                    target_location.distance_squared(last_seen) <= range_sq
                }
                _ => false,
            };

            let mut outcome = None;
            if auto_success {
                outcome = Some(Stimulus::sensed(
                    SenseKind::Sight,
                    1.0,
                    target_location,
                    observer.location,
                ));
                query.last_result = true;
                stats.auto_successes += 1;
            } else if sight.in_sight_pie(&observer, target_location, sight.radius_sq(query.last_result)) {
                let result = if target.can_be_seen_from {
                    tester.can_be_seen_from(
                        observer.location,
                        target.handle,
                        target_location,
                        Some(listener.handle),
                    )
                } else {
                    tester.line_of_sight(observer.location, target_location, Some(listener.handle))
                };
                stats.traces += result.traces.max(1);

                if result.visible {
                    outcome = Some(Stimulus::sensed(
                        SenseKind::Sight,
                        result.strength,
                        result.seen_location,
                        observer.location,
                    ));
                    query.last_seen_location = Some(result.seen_location);
                    query.last_result = true;
                } else if query.last_result {
                    outcome = Some(Stimulus::lost(SenseKind::Sight, target_location, observer.location));
                    query.last_result = false;
                    query.last_seen_location = None;
                }
            } else if query.last_result {
                outcome = Some(Stimulus::lost(SenseKind::Sight, target_location, observer.location));
                query.last_result = false;
                query.last_seen_location = None;
            }

            if let Some(stimulus) = outcome {
                deliver(listener, target.handle, query.attitude, stimulus);
            }

            query.age = 0;
            query.importance = query_importance(observer.location, target_location, &sight, &self.config);
            stats.processed += 1;

            if stats.processed % check_every == 0 && Instant::now() >= deadline {
                stats.hit_time_limit = true;
            }
        }

        flagged.sort_unstable();
        flagged.dedup();
        let removed: Vec<SightQuery> = flagged
            .iter()
            .rev()
            .map(|&index| self.queries.swap_remove(index))
            .collect();
        for query in &removed {
            self.pairs.remove(&(query.observer, query.target));
            if query.last_result {
                emit_lost(query, listeners, targets);
            }
        }
        stats.removed = removed.len() as u32;

        for id in dead_targets {
            stats.removed += self.retire(|q| q.target == id, listeners, targets) as u32;
            targets.remove(id);
        }

        self.sort_queries();

        tracing::debug!(
            "Sight update: {} processed, {} skipped, {} traces, {} auto, {} removed, {} queued ({:?}{})",
            stats.processed,
            stats.skipped,
            stats.traces,
            stats.auto_successes,
            stats.removed,
            self.queries.len(),
            started.elapsed(),
            if stats.hit_time_limit { ", out of time" } else { "" }
        );

        stats
    }
}

fn deliver(listener: &mut Listener, source: EntityHandle, attitude: Attitude, stimulus: Stimulus) {
    if let Err(err) = listener.history.register_stimulus(source, attitude, stimulus) {
        tracing::error!("Listener {}: dropped sight stimulus: {}", listener.id, err);
    }
}

/// Queue a "no longer seen" stimulus for a query that is going away
fn emit_lost(query: &SightQuery, listeners: &mut ListenerRegistry, targets: &TargetRegistry) {
    let (Some(listener), Some(target)) = (listeners.get_mut(query.observer), targets.get(query.target))
    else {
        report_missing_endpoint(query);
        return;
    };
    let stimulus = Stimulus::lost(SenseKind::Sight, target.location, listener.pose.location);
    deliver(listener, target.handle, query.attitude, stimulus);
}

fn report_missing_endpoint(query: &SightQuery) {
    tracing::error!(
        "Sight query {} -> {} outlived its listener or target registration",
        query.observer,
        query.target
    );
    debug_assert!(
        false,
        "sight query {} -> {} outlived its registration",
        query.observer,
        query.target
    );
}

impl Sense for SightScheduler {
    fn kind(&self) -> SenseKind {
        SenseKind::Sight
    }

    fn on_new_listener(&mut self, ctx: &mut SenseContext<'_>, listener: ListenerId) {
        let Some(listener) = ctx.listeners.get(listener) else {
            return;
        };
        if self.generate_for_listener(listener, ctx.targets, ctx.world, &AHashMap::new()) > 0 {
            self.sort_queries();
        }
    }

    fn on_listener_updated(&mut self, ctx: &mut SenseContext<'_>, listener: ListenerId) {
        let mut previous = Vec::new();
        self.queries.retain(|q| {
            if q.observer == listener {
                previous.push(*q);
                false
            } else {
                true
            }
        });

        let mut carried = AHashMap::with_capacity(previous.len());
        for query in &previous {
            self.pairs.remove(&(query.observer, query.target));
            carried.insert(query.target, CarriedResult::from(query));
        }

        if let Some(updated) = ctx.listeners.get(listener) {
            self.generate_for_listener(updated, ctx.targets, ctx.world, &carried);
        }

        // Pairs the new configuration no longer tracks
        for query in &previous {
            if query.last_result && !self.pairs.contains(&(query.observer, query.target)) {
                emit_lost(query, ctx.listeners, ctx.targets);
            }
        }

        self.sort_queries();
    }

    fn on_listener_removed(&mut self, ctx: &mut SenseContext<'_>, listener: ListenerId) {
        self.retire(|q| q.observer == listener, ctx.listeners, ctx.targets);
    }

    fn on_new_target(&mut self, ctx: &mut SenseContext<'_>, target: TargetId) {
        let Some(target) = ctx.targets.get(target) else {
            return;
        };
        if self.generate_for_target(target, ctx.listeners, ctx.world) > 0 {
            self.sort_queries();
        }
    }

    fn on_target_removed(&mut self, ctx: &mut SenseContext<'_>, target: TargetId) {
        self.retire(|q| q.target == target, ctx.listeners, ctx.targets);
    }

    fn update(
        &mut self,
        ctx: &mut SenseContext<'_>,
        tester: &mut dyn VisibilityTester,
    ) -> SenseTickStats {
        self.run_update(ctx.listeners, ctx.targets, ctx.world, tester)
    }
}
