pub mod config;
pub mod error;
pub mod types;

pub use config::{PerceptionConfig, SightSchedulerConfig};
pub use error::{PerceptionError, Result};
pub use types::{Attitude, EntityHandle, ListenerId, StableId, TargetId, TeamId};
