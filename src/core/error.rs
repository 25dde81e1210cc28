use thiserror::Error;

use crate::core::types::StableId;
use crate::perception::sense::SenseKind;

#[derive(Error, Debug)]
pub enum PerceptionError {
    #[error("Listener not found: {0}")]
    ListenerNotFound(StableId),

    #[error("Sense {sense:?} is not configured on listener {listener}")]
    SenseNotConfigured { listener: StableId, sense: SenseKind },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PerceptionError>;
