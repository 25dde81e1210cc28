//! Arc Perception - budgeted sight scheduling and stimulus memory

pub mod core;
pub mod perception;
pub mod world;

pub use crate::core::{PerceptionConfig, PerceptionError, Result};
pub use crate::perception::{PerceptionEvent, PerceptionSystem};
