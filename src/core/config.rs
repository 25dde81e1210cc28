//! Perception configuration with documented constants
//!
//! All scheduler knobs are collected here with explanations of their purpose
//! and how they interact with each other. Per-listener sense settings live in
//! [`crate::perception::listener::ListenerConfig`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::core::error::{PerceptionError, Result};

/// Budget and priority settings for the sight query scheduler
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SightSchedulerConfig {
    // === BUDGET ===
    /// Geometric visibility tests allowed per scheduler update
    ///
    /// Once this many traces have been charged, the rest of the queue is aged
    /// instead of processed. With N uniform queries every query is serviced
    /// within roughly N / max_traces_per_tick updates.
    pub max_traces_per_tick: u32,

    /// Wall-clock budget per scheduler update, in milliseconds
    ///
    /// Advisory only: it is polled every `min_queries_per_time_slice_check`
    /// queries, so the real overrun is bounded by that many query costs.
    pub max_time_slice_ms: f32,

    /// How many queries are processed between two deadline polls (K)
    ///
    /// Lower = tighter time budget, more clock reads.
    /// Higher = cheaper polling, larger worst-case overrun.
    pub min_queries_per_time_slice_check: u32,

    // === IMPORTANCE ===
    /// Pairs closer than this always get `max_query_importance`
    pub high_importance_distance: f32,

    /// Importance given to near pairs
    pub max_query_importance: f32,

    /// Importance floor reached at the listener's sight radius
    ///
    /// Must be <= `max_query_importance`; pairs further away are clamped here.
    pub sight_limit_query_importance: f32,
}

impl Default for SightSchedulerConfig {
    fn default() -> Self {
        Self {
            max_traces_per_tick: 6,
            max_time_slice_ms: 5.0,
            min_queries_per_time_slice_check: 40,

            high_importance_distance: 300.0,
            max_query_importance: 60.0,
            sight_limit_query_importance: 10.0,
        }
    }
}

impl SightSchedulerConfig {
    pub fn max_time_slice(&self) -> Duration {
        Duration::from_micros((self.max_time_slice_ms.max(0.0) * 1000.0).round() as u64)
    }

    pub fn high_importance_distance_sq(&self) -> f32 {
        self.high_importance_distance * self.high_importance_distance
    }
}

/// Top-level configuration for a [`crate::perception::PerceptionSystem`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub scheduler: SightSchedulerConfig,

    /// Seconds of simulated time between two stimulus aging passes
    ///
    /// Each pass ages every stored stimulus by this amount, so stimulus ages
    /// and sense max ages are both expressed in seconds.
    pub aging_rate: f32,

    /// Drop an entity from a listener's memory once none of its senses is live
    ///
    /// When false, expired entries stay around (marked expired) until an
    /// explicit forget.
    pub forget_stale_actors: bool,

    /// Ticks between two automatic sweeps of dead sight sources (0 = never)
    pub cleanse_interval_ticks: u32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            scheduler: SightSchedulerConfig::default(),
            aging_rate: 0.3,
            forget_stale_actors: false,
            cleanse_interval_ticks: 60,
        }
    }
}

impl PerceptionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        let s = &self.scheduler;

        if s.max_traces_per_tick == 0 {
            return Err("max_traces_per_tick must be at least 1".into());
        }

        if s.min_queries_per_time_slice_check == 0 {
            return Err("min_queries_per_time_slice_check must be at least 1".into());
        }

        if s.sight_limit_query_importance > s.max_query_importance {
            return Err(format!(
                "sight_limit_query_importance ({}) should be <= max_query_importance ({})",
                s.sight_limit_query_importance, s.max_query_importance
            ));
        }

        if !(self.aging_rate > 0.0) {
            return Err("aging_rate must be positive".into());
        }

        Ok(())
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: PerceptionConfig = toml::from_str(content)?;
        config.validate().map_err(PerceptionError::InvalidConfig)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }
}
