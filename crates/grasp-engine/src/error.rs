use grasp_core::errors::{ConfigError, SemanticValidationError};
use grasp_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("config cannot be applied: {0}")]
    Semantic(#[from] SemanticValidationError),
}

impl EngineError {
    /// The structural or parse error behind a rejected save, if that is what this is.
    pub fn as_config_error(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(e) | Self::Store(StoreError::Validation(e)) => Some(e),
            _ => None,
        }
    }
}
