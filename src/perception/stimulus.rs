//! One sense-specific perception outcome and its aging/merge rules

use glam::Vec3;
use serde::Serialize;

use crate::perception::sense::SenseKind;

/// Expiration age of a sense that never forgets on its own
pub const NEVER_EXPIRES: f32 = f32::MAX;

/// Lifecycle of a stored stimulus slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StimulusState {
    /// Currently sensed
    Sensed,
    /// Was sensed, the latest report says it no longer is
    NotCurrent,
    /// Aged past its expiration age
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stimulus {
    pub sense: SenseKind,
    /// In [0, 1]
    pub strength: f32,
    /// Where the stimulus came from
    pub stimulus_location: Vec3,
    /// Where the listener was when it received it
    pub receiver_location: Vec3,
    /// Seconds since the stimulus was produced
    pub age: f32,
    pub expiration_age: f32,
    successfully_sensed: bool,
    expired: bool,
}

impl Stimulus {
    /// A successful perception
    pub fn sensed(
        sense: SenseKind,
        strength: f32,
        stimulus_location: Vec3,
        receiver_location: Vec3,
    ) -> Self {
        Self {
            sense,
            strength: strength.clamp(0.0, 1.0),
            stimulus_location,
            receiver_location,
            age: 0.0,
            expiration_age: NEVER_EXPIRES,
            successfully_sensed: true,
            expired: false,
        }
    }

    /// A "no longer sensed" report
    pub fn lost(sense: SenseKind, stimulus_location: Vec3, receiver_location: Vec3) -> Self {
        Self {
            strength: 0.0,
            successfully_sensed: false,
            ..Self::sensed(sense, 0.0, stimulus_location, receiver_location)
        }
    }

    pub fn with_age(mut self, age: f32) -> Self {
        self.age = age;
        self
    }

    pub fn was_successfully_sensed(&self) -> bool {
        self.successfully_sensed
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Sensed and not expired
    pub fn is_active(&self) -> bool {
        self.successfully_sensed && !self.expired
    }

    pub fn state(&self) -> StimulusState {
        if self.expired {
            StimulusState::Expired
        } else if self.successfully_sensed {
            StimulusState::Sensed
        } else {
            StimulusState::NotCurrent
        }
    }

    pub fn mark_no_longer_sensed(&mut self) {
        self.successfully_sensed = false;
    }

    pub fn mark_expired(&mut self) {
        self.expired = true;
        self.successfully_sensed = false;
    }

    /// Advance age by `rate`; returns false once the stimulus is past its expiration age
    pub fn age_by(&mut self, rate: f32) -> bool {
        self.age += rate;
        self.age < self.expiration_age
    }

    /// Merge predicate: the incoming stimulus wins iff it is at least as
    /// young as the stored one, or strictly stronger.
    pub fn should_replace(stored: &Stimulus, incoming: &Stimulus) -> bool {
        incoming.age <= stored.age || stored.strength < incoming.strength
    }
}

/// Merge `incoming` into `stored`; returns true if the slot was overwritten
pub fn merge(stored: &mut Stimulus, incoming: Stimulus) -> bool {
    if Stimulus::should_replace(stored, &incoming) {
        *stored = incoming;
        true
    } else {
        false
    }
}
