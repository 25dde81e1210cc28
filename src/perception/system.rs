//! Perception system - the scheduler context object
//!
//! Owns the listener and target registries, the sight scheduler and the
//! deferred maintenance list. One instance per simulation; every operation
//! takes the world (and the visibility tester, for updates) explicitly.
//!
//! A tick runs: deferred stale cleanup -> periodic dead-source sweep ->
//! sight update -> stimulus aging -> apply queued stimuli.

use serde::Serialize;

use crate::core::config::PerceptionConfig;
use crate::core::error::{PerceptionError, Result};
use crate::core::types::{EntityHandle, ListenerId, StableId, TargetId};
use crate::perception::events::PerceptionEvent;
use crate::perception::history::{PerceivedEntity, StimulusHistory, Trace};
use crate::perception::listener::{Listener, ListenerConfig, ListenerRegistry};
use crate::perception::sense::{Sense, SenseContext, SenseKind, SenseTickStats};
use crate::perception::sight::SightScheduler;
use crate::perception::stimulus::Stimulus;
use crate::perception::target::{Target, TargetRegistry};
use crate::world::{PerceptionWorld, VisibilityTester};

/// Everything one [`PerceptionSystem::tick`] produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickOutcome {
    pub sight: SenseTickStats,
    /// Stale entries removed by deferred maintenance
    pub purged: usize,
    /// Dead sources removed by the periodic sweep
    pub cleansed: usize,
    /// Aging passes run this tick
    pub aging_passes: u32,
    pub events: Vec<PerceptionEvent>,
}

pub struct PerceptionSystem {
    config: PerceptionConfig,
    listeners: ListenerRegistry,
    targets: TargetRegistry,
    sight: SightScheduler,
    /// Stale entries reported by read-only lookups, removed at the next maintenance pass
    pending_stale: Vec<(ListenerId, Vec<EntityHandle>)>,
    aging_accumulator: f32,
    tick_count: u64,
}

impl PerceptionSystem {
    pub fn new(config: PerceptionConfig) -> Result<Self> {
        config.validate().map_err(PerceptionError::InvalidConfig)?;

        Ok(Self {
            sight: SightScheduler::new(config.scheduler.clone()),
            config,
            listeners: ListenerRegistry::new(),
            targets: TargetRegistry::new(),
            pending_stale: Vec::new(),
            aging_accumulator: 0.0,
            tick_count: 0,
        })
    }

    pub fn config(&self) -> &PerceptionConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // === LISTENERS ===

    /// Register a listener, or reconfigure it if this exact entity is already registered
    ///
    /// A different incarnation holding the same stable id is unregistered
    /// first; its memory is not carried over.
    pub fn register_listener(
        &mut self,
        handle: EntityHandle,
        config: &ListenerConfig,
        world: &dyn PerceptionWorld,
    ) {
        if let Some(existing) = self.listeners.get(handle.id).map(|l| l.handle) {
            if existing == handle {
                self.reconfigure(handle, config, world);
                return;
            }
            tracing::warn!("Listener id {} recycled: {} replaces {}", handle.id, handle, existing);
            self.unregister_listener(existing, world);
        }

        let mut listener = Listener::new(handle, config, self.config.forget_stale_actors);
        listener.refresh_pose(world);
        self.listeners.insert(listener);

        let mut ctx = SenseContext {
            listeners: &mut self.listeners,
            targets: &mut self.targets,
            world,
        };
        self.sight.on_new_listener(&mut ctx, handle.id);
    }

    /// Change the sense configuration of a registered listener
    pub fn update_listener(
        &mut self,
        handle: EntityHandle,
        config: &ListenerConfig,
        world: &dyn PerceptionWorld,
    ) -> Result<()> {
        match self.listeners.get(handle.id) {
            Some(listener) if listener.handle == handle => {
                self.reconfigure(handle, config, world);
                Ok(())
            }
            _ => Err(PerceptionError::ListenerNotFound(handle.id)),
        }
    }

    fn reconfigure(&mut self, handle: EntityHandle, config: &ListenerConfig, world: &dyn PerceptionWorld) {
        if let Some(listener) = self.listeners.get_mut(handle.id) {
            listener.apply_config(config);
            listener.refresh_pose(world);
        }

        let mut ctx = SenseContext {
            listeners: &mut self.listeners,
            targets: &mut self.targets,
            world,
        };
        self.sight.on_listener_updated(&mut ctx, handle.id);
    }

    /// Remove a listener together with its queries and its memory
    ///
    /// Returns false if `handle` is not the registered incarnation.
    pub fn unregister_listener(&mut self, handle: EntityHandle, world: &dyn PerceptionWorld) -> bool {
        if self.listeners.get(handle.id).map(|l| l.handle) != Some(handle) {
            return false;
        }

        let mut ctx = SenseContext {
            listeners: &mut self.listeners,
            targets: &mut self.targets,
            world,
        };
        self.sight.on_listener_removed(&mut ctx, handle.id);

        self.listeners.remove(handle.id);
        self.pending_stale.retain(|(listener, _)| *listener != handle.id);
        tracing::debug!("Unregistered listener {}", handle);
        true
    }

    // === SOURCES ===

    /// Register an entity as something sight can see; false if dead or already registered
    pub fn register_source(
        &mut self,
        handle: EntityHandle,
        can_be_seen_from: bool,
        world: &dyn PerceptionWorld,
    ) -> bool {
        let Some(location) = world.location(handle) else {
            tracing::debug!("Not registering dead sight source {}", handle);
            return false;
        };

        if let Some(existing) = self.targets.get(handle.id).map(|t| t.handle) {
            if existing == handle {
                return false;
            }
            tracing::warn!("Sight source id {} recycled: {} replaces {}", handle.id, handle, existing);
            self.unregister_source(existing, world);
        }

        self.targets.insert(Target::new(handle, can_be_seen_from, location));

        let mut ctx = SenseContext {
            listeners: &mut self.listeners,
            targets: &mut self.targets,
            world,
        };
        self.sight.on_new_target(&mut ctx, handle.id);
        true
    }

    /// Stop tracking a sight source; listeners seeing it are told they no longer do
    pub fn unregister_source(&mut self, handle: EntityHandle, world: &dyn PerceptionWorld) -> bool {
        if self.targets.get(handle.id).map(|t| t.handle) != Some(handle) {
            return false;
        }
        self.remove_target(handle.id, world);
        true
    }

    fn remove_target(&mut self, id: TargetId, world: &dyn PerceptionWorld) {
        let mut ctx = SenseContext {
            listeners: &mut self.listeners,
            targets: &mut self.targets,
            world,
        };
        self.sight.on_target_removed(&mut ctx, id);
        self.targets.remove(id);
    }

    /// Sweep sources whose entity died, with their queries; returns how many went
    ///
    /// Listeners whose entity died are unregistered in the same sweep.
    pub fn cleanse_invalid_sources(&mut self, world: &dyn PerceptionWorld) -> usize {
        let invalid = self.targets.invalid_targets(world);
        for id in &invalid {
            self.remove_target(*id, world);
        }
        if !invalid.is_empty() {
            self.targets.compact();
            tracing::debug!("Cleansed {} dead sight sources", invalid.len());
        }

        let dead_listeners: Vec<EntityHandle> = self
            .listeners
            .iter()
            .filter(|l| !world.is_alive(l.handle))
            .map(|l| l.handle)
            .collect();
        for handle in &dead_listeners {
            self.unregister_listener(*handle, world);
        }
        if !dead_listeners.is_empty() {
            tracing::debug!("Dropped {} dead listeners", dead_listeners.len());
        }

        invalid.len()
    }

    // === STIMULI ===

    /// Queue a stimulus from a non-scheduled sense (hearing, damage, touch)
    pub fn report_stimulus(
        &mut self,
        listener: ListenerId,
        source: EntityHandle,
        stimulus: Stimulus,
        world: &dyn PerceptionWorld,
    ) -> Result<()> {
        let listener = self
            .listeners
            .get_mut(listener)
            .ok_or(PerceptionError::ListenerNotFound(listener))?;
        let attitude = world.attitude(listener.team, source);
        listener.history.register_stimulus(source, attitude, stimulus)
    }

    /// Run one budgeted sight pass; outcomes stay queued until [`Self::process_stimuli`]
    pub fn update_sight(
        &mut self,
        world: &dyn PerceptionWorld,
        tester: &mut dyn VisibilityTester,
    ) -> SenseTickStats {
        let mut ctx = SenseContext {
            listeners: &mut self.listeners,
            targets: &mut self.targets,
            world,
        };
        self.sight.update(&mut ctx, tester)
    }

    /// Age every listener's memory by `rate`; true if anything expired
    pub fn age_stimuli(&mut self, rate: f32) -> bool {
        self.listeners
            .iter_mut()
            .fold(false, |any, listener| listener.history.age_stimuli(rate) | any)
    }

    /// Apply queued stimuli on every listener and collect all pending events
    pub fn process_stimuli(&mut self) -> Vec<PerceptionEvent> {
        for listener in self.listeners.iter_mut() {
            if listener.history.has_queued_stimuli() {
                listener.history.process_stimuli();
            }
        }
        self.drain_events()
    }

    /// Events produced since the last drain, listener by listener
    pub fn drain_events(&mut self) -> Vec<PerceptionEvent> {
        let mut events = Vec::new();
        for listener in self.listeners.iter_mut() {
            events.extend(listener.history.drain_events());
        }
        events
    }

    /// Advance perception by `dt` seconds of simulated time
    pub fn tick(
        &mut self,
        world: &dyn PerceptionWorld,
        tester: &mut dyn VisibilityTester,
        dt: f32,
    ) -> TickOutcome {
        self.tick_count += 1;
        let mut outcome = TickOutcome {
            purged: self.run_maintenance(),
            ..Default::default()
        };

        let interval = u64::from(self.config.cleanse_interval_ticks);
        if interval > 0 && self.tick_count % interval == 0 {
            outcome.cleansed = self.cleanse_invalid_sources(world);
        }

        // Expiration notices must be queued ahead of this tick's sight outcomes
        let rate = self.config.aging_rate;
        self.aging_accumulator += dt.max(0.0);
        while self.aging_accumulator >= rate {
            self.age_stimuli(rate);
            self.aging_accumulator -= rate;
            outcome.aging_passes += 1;
        }

        outcome.sight = self.update_sight(world, tester);

        outcome.events = self.process_stimuli();
        outcome
    }

    // === FORGETTING ===

    pub fn forget_entity(&mut self, listener: ListenerId, entity: StableId) -> Result<bool> {
        let listener = self
            .listeners
            .get_mut(listener)
            .ok_or(PerceptionError::ListenerNotFound(listener))?;
        Ok(listener.history.forget(entity))
    }

    pub fn forget_all(&mut self, listener: ListenerId) -> Result<bool> {
        let listener = self
            .listeners
            .get_mut(listener)
            .ok_or(PerceptionError::ListenerNotFound(listener))?;
        Ok(listener.history.forget_all())
    }

    // === LOOKUPS ===

    pub fn listener(&self, id: ListenerId) -> Option<&Listener> {
        self.listeners.get(id)
    }

    pub fn listeners(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.iter()
    }

    pub fn history(&self, id: ListenerId) -> Option<&StimulusHistory> {
        self.listeners.get(id).map(|l| &l.history)
    }

    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn sight(&self) -> &SightScheduler {
        &self.sight
    }

    /// What `listener` remembers about `entity`
    pub fn entity_info(&self, listener: ListenerId, entity: StableId) -> Option<&PerceivedEntity> {
        self.history(listener).and_then(|h| h.entity(entity))
    }

    /// Youngest `sense` stimulus a listener holds
    ///
    /// Memory is not touched; entries about dead entities found on the way
    /// are removed at the start of the next tick.
    pub fn freshest_trace(
        &mut self,
        listener: ListenerId,
        sense: SenseKind,
        world: &dyn PerceptionWorld,
    ) -> Result<Option<Trace>> {
        let history = self
            .history(listener)
            .ok_or(PerceptionError::ListenerNotFound(listener))?;
        let found = history.freshest_trace(sense, world);
        self.schedule_stale_cleanup(listener, found.stale);
        Ok(found.trace)
    }

    /// Queue entries for removal at the next maintenance pass
    pub fn schedule_stale_cleanup(&mut self, listener: ListenerId, stale: Vec<EntityHandle>) {
        if !stale.is_empty() {
            self.pending_stale.push((listener, stale));
        }
    }

    /// Remove everything scheduled by read-only lookups; returns the number of entries purged
    pub fn run_maintenance(&mut self) -> usize {
        let mut purged = 0;
        for (id, stale) in std::mem::take(&mut self.pending_stale) {
            if let Some(listener) = self.listeners.get_mut(id) {
                purged += listener.history.purge_stale(&stale);
            }
        }
        if purged > 0 {
            tracing::debug!("Purged {} stale memory entries", purged);
        }
        purged
    }
}
