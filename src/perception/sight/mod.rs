//! Sight: budgeted, globally prioritized (listener, target) visibility queries

pub mod query;
pub mod scheduler;

pub use query::{query_importance, SightQuery};
pub use scheduler::SightScheduler;
