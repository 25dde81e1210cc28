//! Perception - who can currently sense whom, under a bounded per-tick cost
//!
//! Listeners perceive, targets are perceived. Sight is resolved by a single
//! globally prioritized query list processed a budgeted slice at a time;
//! every outcome lands in the listener's [`history::StimulusHistory`].

pub mod digest;
pub mod events;
pub mod history;
pub mod listener;
pub mod sense;
pub mod sight;
pub mod stimulus;
pub mod system;
pub mod target;

pub use events::PerceptionEvent;
pub use history::{FreshestTrace, PerceivedEntity, StimulusHistory, Trace};
pub use listener::{ConfigIssue, Listener, ListenerConfig, SenseConfig, SightConfig};
pub use sense::{Sense, SenseKind, SenseTickStats};
pub use sight::{SightQuery, SightScheduler};
pub use stimulus::{Stimulus, StimulusState};
pub use system::{PerceptionSystem, TickOutcome};
pub use target::Target;
