//! Per-listener memory of sensed entities
//!
//! Stimuli are applied in two phases. [`StimulusHistory::register_stimulus`]
//! only queues; [`StimulusHistory::process_stimuli`] applies the whole queue
//! in arrival order and emits one batched notification. This lets a sense
//! pass register many stimuli without re-entering the merge/notify logic.
//!
//! Each entity gets one slot per sense, overwritten in place by the merge
//! rule in [`crate::perception::stimulus::merge`].

use ahash::AHashMap;
use glam::Vec3;

use crate::core::error::{PerceptionError, Result};
use crate::core::types::{Attitude, EntityHandle, ListenerId, StableId};
use crate::perception::events::PerceptionEvent;
use crate::perception::sense::SenseKind;
use crate::perception::stimulus::{merge, Stimulus, NEVER_EXPIRES};
use crate::world::PerceptionWorld;

/// A stimulus waiting to be applied, with the entity that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcedStimulus {
    pub source: EntityHandle,
    /// Observer's attitude towards the source when the stimulus was produced
    pub attitude: Attitude,
    pub stimulus: Stimulus,
}

/// Everything a listener remembers about one entity
#[derive(Debug, Clone)]
pub struct PerceivedEntity {
    pub handle: EntityHandle,
    stimuli: [Option<Stimulus>; SenseKind::COUNT],
    dominant_sense: Option<SenseKind>,
    attitude: Attitude,
}

impl PerceivedEntity {
    fn new(handle: EntityHandle, dominant_sense: Option<SenseKind>, attitude: Attitude) -> Self {
        Self {
            handle,
            stimuli: [None; SenseKind::COUNT],
            dominant_sense,
            attitude,
        }
    }

    pub fn stimulus(&self, sense: SenseKind) -> Option<&Stimulus> {
        self.stimuli[sense.index()].as_ref()
    }

    pub fn stimuli(&self) -> impl Iterator<Item = &Stimulus> {
        self.stimuli.iter().flatten()
    }

    pub fn is_hostile(&self) -> bool {
        self.attitude == Attitude::Hostile
    }

    pub fn attitude(&self) -> Attitude {
        self.attitude
    }

    pub fn has_active_stimulus(&self, sense: SenseKind) -> bool {
        self.stimulus(sense).map_or(false, |s| s.is_active())
    }

    /// Currently sensed by at least one sense
    pub fn has_any_active_stimulus(&self) -> bool {
        self.stimuli().any(|s| s.is_active())
    }

    /// At least one sense slot has not expired yet
    pub fn has_any_live_stimulus(&self) -> bool {
        self.stimuli().any(|s| !s.is_expired())
    }

    pub fn youngest_stimulus_age(&self) -> Option<f32> {
        self.stimuli().map(|s| s.age).reduce(f32::min)
    }

    /// Location from the dominant sense if it ever fired, else from the youngest stimulus
    pub fn last_stimulus_location(&self) -> Option<Vec3> {
        if let Some(dominant) = self.dominant_sense.and_then(|sense| self.stimulus(sense)) {
            return Some(dominant.stimulus_location);
        }
        self.stimuli()
            .min_by(|a, b| a.age.total_cmp(&b.age))
            .map(|s| s.stimulus_location)
    }
}

/// Youngest stimulus for one sense, found by [`StimulusHistory::freshest_trace`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    pub handle: EntityHandle,
    pub location: Vec3,
    pub age: f32,
}

/// Result of a read-only freshest-trace lookup
///
/// `stale` lists entries whose entity no longer exists. They are not removed
/// by the lookup; pass them to [`StimulusHistory::purge_stale`] at the next
/// maintenance point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreshestTrace {
    pub trace: Option<Trace>,
    pub stale: Vec<EntityHandle>,
}

#[derive(Debug, Clone)]
pub struct StimulusHistory {
    owner: ListenerId,
    /// Max age per sense; None means the sense is not configured
    max_age: [Option<f32>; SenseKind::COUNT],
    dominant_sense: Option<SenseKind>,
    forget_stale: bool,
    entries: AHashMap<StableId, PerceivedEntity>,
    queued: Vec<SourcedStimulus>,
    events: Vec<PerceptionEvent>,
}

impl StimulusHistory {
    pub fn new(owner: ListenerId, forget_stale: bool) -> Self {
        Self {
            owner,
            max_age: [None; SenseKind::COUNT],
            dominant_sense: None,
            forget_stale,
            entries: AHashMap::new(),
            queued: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn owner(&self) -> ListenerId {
        self.owner
    }

    /// Enable a sense; a max age of 0 means its stimuli never expire
    pub fn configure_sense(&mut self, sense: SenseKind, max_age: f32) {
        let expiration = if max_age > 0.0 { max_age } else { NEVER_EXPIRES };
        self.max_age[sense.index()] = Some(expiration);
    }

    pub fn clear_senses(&mut self) {
        self.max_age = [None; SenseKind::COUNT];
    }

    pub fn is_sense_configured(&self, sense: SenseKind) -> bool {
        self.max_age[sense.index()].is_some()
    }

    pub fn set_dominant_sense(&mut self, sense: Option<SenseKind>) {
        self.dominant_sense = sense;
        for entry in self.entries.values_mut() {
            entry.dominant_sense = sense;
        }
    }

    pub fn set_forget_stale(&mut self, forget_stale: bool) {
        self.forget_stale = forget_stale;
    }

    /// Queue a stimulus; nothing is applied until [`Self::process_stimuli`]
    pub fn register_stimulus(
        &mut self,
        source: EntityHandle,
        attitude: Attitude,
        stimulus: Stimulus,
    ) -> Result<()> {
        if !self.is_sense_configured(stimulus.sense) {
            return Err(PerceptionError::SenseNotConfigured {
                listener: self.owner,
                sense: stimulus.sense,
            });
        }

        self.queued.push(SourcedStimulus {
            source,
            attitude,
            stimulus,
        });
        Ok(())
    }

    pub fn has_queued_stimuli(&self) -> bool {
        !self.queued.is_empty()
    }

    /// Apply every queued stimulus once, in arrival order
    ///
    /// Returns false (and does nothing) if the queue was empty.
    pub fn process_stimuli(&mut self) -> bool {
        if self.queued.is_empty() {
            tracing::debug!("Listener {} asked to process stimuli with none queued", self.owner);
            return false;
        }

        let queued = std::mem::take(&mut self.queued);
        let mut updated: Vec<EntityHandle> = Vec::new();
        let mut to_forget: Vec<StableId> = Vec::new();

        for sourced in queued {
            let applied = self.apply(sourced, &mut to_forget);
            if let Some(stimulus) = applied {
                self.events.push(PerceptionEvent::TargetPerceptionUpdated {
                    listener: self.owner,
                    target: sourced.source,
                    stimulus,
                });
                if !updated.contains(&sourced.source) {
                    updated.push(sourced.source);
                }
            }
        }

        self.events.push(PerceptionEvent::PerceptionUpdated {
            listener: self.owner,
            targets: updated,
        });

        for id in to_forget {
            // Re-sensed later in the same batch
            if self.entries.get(&id).map_or(false, |e| e.has_any_live_stimulus()) {
                continue;
            }
            self.forget(id);
        }

        true
    }

    /// Apply one stimulus; returns the resulting slot content, or None if nothing was stored
    fn apply(&mut self, sourced: SourcedStimulus, to_forget: &mut Vec<StableId>) -> Option<Stimulus> {
        let SourcedStimulus {
            source,
            attitude,
            stimulus,
        } = sourced;
        let id = source.id;

        if let Some(existing) = self.entries.get(&id) {
            if source.is_recycled_from(&existing.handle) {
                tracing::warn!(
                    "Listener {}: id {} now belongs to {}, replacing memory of {}",
                    self.owner,
                    id,
                    source,
                    existing.handle
                );
                self.entries.remove(&id);
            }
        }

        if !self.entries.contains_key(&id) {
            // Failing to sense something we never knew about is not worth remembering
            if !stimulus.was_successfully_sensed() {
                return None;
            }
            self.entries.insert(
                id,
                PerceivedEntity::new(source, self.dominant_sense, attitude),
            );
        }

        let expiration = self.max_age[stimulus.sense.index()].unwrap_or(NEVER_EXPIRES);
        let forget_stale = self.forget_stale;
        let index = stimulus.sense.index();
        let entry = self.entries.get_mut(&id)?;
        entry.attitude = attitude;

        if stimulus.was_successfully_sensed() {
            let mut incoming = stimulus;
            incoming.expiration_age = expiration;
            match entry.stimuli[index].as_mut() {
                Some(stored) => {
                    merge(stored, incoming);
                }
                None => entry.stimuli[index] = Some(incoming),
            }
        } else {
            let stored_expired = entry.stimuli[index].as_ref().map(|s| s.is_expired())?;
            if stimulus.is_expired() && !stored_expired {
                // The slot was refreshed after it expired; keep the fresh state
                self.events.push(PerceptionEvent::StimulusExpired {
                    listener: self.owner,
                    target: source,
                    sense: stimulus.sense,
                });
                return None;
            }
            if stored_expired {
                // Only the aging notice announces the expiration
                if stimulus.is_expired() {
                    self.events.push(PerceptionEvent::StimulusExpired {
                        listener: self.owner,
                        target: source,
                        sense: stimulus.sense,
                    });
                }
                if forget_stale && !entry.has_any_live_stimulus() && !to_forget.contains(&id) {
                    to_forget.push(id);
                }
            } else if let Some(stored) = entry.stimuli[index].as_mut() {
                stored.mark_no_longer_sensed();
            }
        }

        entry.stimuli[index]
    }

    /// Age every stored stimulus by `rate`
    ///
    /// Slots that cross their expiration age are marked expired and an
    /// expiration notice is queued for the next [`Self::process_stimuli`].
    /// Returns true if any slot expired during this call.
    pub fn age_stimuli(&mut self, rate: f32) -> bool {
        let mut any_expired = false;

        for entry in self.entries.values_mut() {
            for slot in entry.stimuli.iter_mut().flatten() {
                if slot.is_expired() {
                    continue;
                }
                if !slot.age_by(rate) {
                    slot.mark_expired();
                    self.queued.push(SourcedStimulus {
                        source: entry.handle,
                        attitude: entry.attitude,
                        stimulus: *slot,
                    });
                    any_expired = true;
                }
            }
        }

        any_expired
    }

    /// Remove one entity from memory, announcing it first; no-op if unknown
    pub fn forget(&mut self, id: StableId) -> bool {
        let Some(entry) = self.entries.get(&id) else {
            return false;
        };

        self.events.push(PerceptionEvent::TargetForgotten {
            listener: self.owner,
            target: entry.handle,
        });
        self.entries.remove(&id);
        tracing::debug!("Listener {} forgot {}", self.owner, id);
        true
    }

    /// Clear the whole memory with a single announcement; no-op if already empty
    pub fn forget_all(&mut self) -> bool {
        if self.entries.is_empty() {
            return false;
        }

        self.events.push(PerceptionEvent::AllTargetsForgotten {
            listener: self.owner,
        });
        let count = self.entries.len();
        self.entries.clear();
        tracing::debug!("Listener {} forgot all {} entities", self.owner, count);
        true
    }

    /// Youngest stored stimulus for `sense`, without touching storage
    pub fn freshest_trace(&self, sense: SenseKind, world: &dyn PerceptionWorld) -> FreshestTrace {
        let mut result = FreshestTrace::default();

        for entry in self.entries.values() {
            if !world.is_alive(entry.handle) {
                result.stale.push(entry.handle);
                continue;
            }

            let Some(stimulus) = entry.stimulus(sense) else {
                continue;
            };

            if result.trace.map_or(true, |best| stimulus.age < best.age) {
                result.trace = Some(Trace {
                    handle: entry.handle,
                    location: stimulus.stimulus_location,
                    age: stimulus.age,
                });
                if stimulus.age <= 0.0 {
                    break;
                }
            }
        }

        result
    }

    /// Remove entries reported stale by [`Self::freshest_trace`]
    ///
    /// An entry is only removed if it still refers to the same incarnation.
    pub fn purge_stale(&mut self, stale: &[EntityHandle]) -> usize {
        let before = self.entries.len();
        for handle in stale {
            if self.entries.get(&handle.id).map_or(false, |e| e.handle == *handle) {
                self.entries.remove(&handle.id);
            }
        }
        before - self.entries.len()
    }

    pub fn drain_events(&mut self) -> Vec<PerceptionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn entity(&self, id: StableId) -> Option<&PerceivedEntity> {
        self.entries.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &PerceivedEntity> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities known through `sense` (or any sense), optionally only those currently sensed
    pub fn perceived_entities(&self, sense: Option<SenseKind>, currently_only: bool) -> Vec<EntityHandle> {
        self.entries
            .values()
            .filter(|entry| match (sense, currently_only) {
                (Some(sense), true) => entry.has_active_stimulus(sense),
                (Some(sense), false) => entry.stimulus(sense).is_some(),
                (None, true) => entry.has_any_active_stimulus(),
                (None, false) => true,
            })
            .map(|entry| entry.handle)
            .collect()
    }

    pub fn hostile_entities(&self) -> Vec<EntityHandle> {
        self.entries
            .values()
            .filter(|entry| entry.is_hostile())
            .map(|entry| entry.handle)
            .collect()
    }

    pub fn has_active_stimulus(&self, id: StableId, sense: SenseKind) -> bool {
        self.entity(id).map_or(false, |e| e.has_active_stimulus(sense))
    }

    pub fn has_any_active_stimulus(&self, id: StableId) -> bool {
        self.entity(id).map_or(false, |e| e.has_any_active_stimulus())
    }

    pub fn youngest_stimulus_age(&self, id: StableId) -> Option<f32> {
        self.entity(id).and_then(|e| e.youngest_stimulus_age())
    }

    pub fn is_hostile(&self, id: StableId) -> bool {
        self.entity(id).map_or(false, |e| e.is_hostile())
    }
}
