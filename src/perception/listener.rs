//! Listener configuration, digestion and registry
//!
//! A listener is an entity that perceives. Its configuration is read once at
//! registration (and again on reconfiguration) and digested into the
//! per-query parameters the scheduler uses. Configuration problems are
//! reported once here and the affected sense is left out.

use ahash::AHashMap;
use serde::Deserialize;
use thiserror::Error;

use crate::core::types::{EntityHandle, ListenerId, TeamId};
use crate::perception::digest::{
    peripheral_vision_cos, AffiliationMask, DetectionByAffiliation, DigestedSightProperties,
};
use crate::perception::history::StimulusHistory;
use crate::perception::sense::SenseKind;
use crate::world::{PerceptionWorld, Pose};

/// Sight settings for one listener
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SightConfig {
    pub sight_radius: f32,
    /// Radius at which an already visible target is lost; should be >= `sight_radius`
    pub lose_sight_radius: f32,
    /// Half-angle of the view cone, in degrees
    pub peripheral_vision_half_angle_degrees: f32,
    /// Targets staying this close to where they were last seen stay visible without a trace
    pub auto_success_range_from_last_seen: Option<f32>,
    /// Seconds before a sight stimulus expires; 0 = never
    pub max_age: Option<f32>,
    pub detection: DetectionByAffiliation,
}

impl Default for SightConfig {
    fn default() -> Self {
        Self {
            sight_radius: 3000.0,
            lose_sight_radius: 3500.0,
            peripheral_vision_half_angle_degrees: 90.0,
            auto_success_range_from_last_seen: None,
            max_age: Some(0.0),
            detection: DetectionByAffiliation::default(),
        }
    }
}

/// A non-sight channel fed through reported stimuli
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SenseConfig {
    pub kind: SenseKind,
    /// Seconds before a stimulus expires; 0 = never
    pub max_age: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub team: TeamId,
    pub dominant_sense: Option<SenseKind>,
    pub sight: Option<SightConfig>,
    pub senses: Vec<SenseConfig>,
}

impl ListenerConfig {
    pub fn with_sight(team: TeamId, sight: SightConfig) -> Self {
        Self {
            team,
            sight: Some(sight),
            ..Default::default()
        }
    }
}

/// A configuration problem found while digesting a listener
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigIssue {
    #[error("{0:?} has no max age configured")]
    MissingMaxAge(SenseKind),

    #[error("{sense:?} has invalid max age {value}")]
    InvalidMaxAge { sense: SenseKind, value: f32 },

    #[error("{0:?} is configured more than once")]
    DuplicateSense(SenseKind),

    #[error("sight radius {0} is not a positive number")]
    InvalidSightRadius(f32),

    #[error("sight listed as a plain sense; it needs a [sight] section")]
    SightWithoutParameters,

    #[error("lose-sight radius {lose} is below sight radius {sight}, using {sight}")]
    LoseSightBelowSight { sight: f32, lose: f32 },
}

fn validate_max_age(sense: SenseKind, max_age: Option<f32>) -> Result<f32, ConfigIssue> {
    match max_age {
        None => Err(ConfigIssue::MissingMaxAge(sense)),
        Some(value) if !(value >= 0.0) => Err(ConfigIssue::InvalidMaxAge { sense, value }),
        Some(value) => Ok(value),
    }
}

/// Digest sight settings; None if the sight sense has to be left out
pub fn digest_sight(
    config: &SightConfig,
    issues: &mut Vec<ConfigIssue>,
) -> Option<(DigestedSightProperties, f32)> {
    let max_age = match validate_max_age(SenseKind::Sight, config.max_age) {
        Ok(max_age) => max_age,
        Err(issue) => {
            issues.push(issue);
            return None;
        }
    };

    if !(config.sight_radius > 0.0) {
        issues.push(ConfigIssue::InvalidSightRadius(config.sight_radius));
        return None;
    }

    let mut lose_sight_radius = config.lose_sight_radius;
    if !(lose_sight_radius >= config.sight_radius) {
        issues.push(ConfigIssue::LoseSightBelowSight {
            sight: config.sight_radius,
            lose: lose_sight_radius,
        });
        lose_sight_radius = config.sight_radius;
    }

    let digest = DigestedSightProperties {
        sight_radius: config.sight_radius,
        sight_radius_sq: config.sight_radius * config.sight_radius,
        lose_sight_radius_sq: lose_sight_radius * lose_sight_radius,
        peripheral_vision_angle_cos: peripheral_vision_cos(
            config.peripheral_vision_half_angle_degrees,
        ),
        auto_success_range_sq: config
            .auto_success_range_from_last_seen
            .filter(|range| *range > 0.0)
            .map(|range| range * range),
        affiliation: AffiliationMask::from_detection(&config.detection),
    };

    Some((digest, max_age))
}

pub struct Listener {
    pub id: ListenerId,
    pub handle: EntityHandle,
    pub team: TeamId,
    /// Pose sampled once per tick
    pub pose: Pose,
    sight: Option<DigestedSightProperties>,
    config_issues: Vec<ConfigIssue>,
    pub history: StimulusHistory,
}

impl Listener {
    pub fn new(handle: EntityHandle, config: &ListenerConfig, forget_stale: bool) -> Self {
        let mut listener = Self {
            id: handle.id,
            handle,
            team: config.team,
            pose: Pose::default(),
            sight: None,
            config_issues: Vec::new(),
            history: StimulusHistory::new(handle.id, forget_stale),
        };
        listener.apply_config(config);
        listener
    }

    /// Re-digest configuration; stored memories are kept
    pub fn apply_config(&mut self, config: &ListenerConfig) {
        let mut issues = Vec::new();
        self.team = config.team;
        self.history.clear_senses();
        self.history.set_dominant_sense(config.dominant_sense);

        self.sight = match &config.sight {
            Some(sight_config) => digest_sight(sight_config, &mut issues).map(|(digest, max_age)| {
                self.history.configure_sense(SenseKind::Sight, max_age);
                digest
            }),
            None => None,
        };

        for sense in &config.senses {
            if self.history.is_sense_configured(sense.kind)
                || (sense.kind == SenseKind::Sight && config.sight.is_some())
            {
                issues.push(ConfigIssue::DuplicateSense(sense.kind));
                continue;
            }
            if sense.kind == SenseKind::Sight {
                issues.push(ConfigIssue::SightWithoutParameters);
                continue;
            }
            match validate_max_age(sense.kind, sense.max_age) {
                Ok(max_age) => self.history.configure_sense(sense.kind, max_age),
                Err(issue) => issues.push(issue),
            }
        }

        for issue in &issues {
            tracing::warn!("Listener {}: {}", self.id, issue);
        }
        self.config_issues = issues;
    }

    pub fn sight(&self) -> Option<&DigestedSightProperties> {
        self.sight.as_ref()
    }

    pub fn has_sense(&self, sense: SenseKind) -> bool {
        self.history.is_sense_configured(sense)
    }

    /// Problems found by the last configuration pass
    pub fn config_issues(&self) -> &[ConfigIssue] {
        &self.config_issues
    }

    /// Sample the pose from the world; false if the entity is gone
    pub fn refresh_pose(&mut self, world: &dyn PerceptionWorld) -> bool {
        match world.pose(self.handle) {
            Some(pose) => {
                self.pose = pose;
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: AHashMap<ListenerId, Listener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a listener, returning whatever was registered under its id before
    pub fn insert(&mut self, listener: Listener) -> Option<Listener> {
        self.listeners.insert(listener.id, listener)
    }

    pub fn remove(&mut self, id: ListenerId) -> Option<Listener> {
        self.listeners.remove(&id)
    }

    pub fn get(&self, id: ListenerId) -> Option<&Listener> {
        self.listeners.get(&id)
    }

    pub fn get_mut(&mut self, id: ListenerId) -> Option<&mut Listener> {
        self.listeners.get_mut(&id)
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Listener> {
        self.listeners.values_mut()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
