use crate::engine::Engine;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the orchestrator to whoever submitted the request.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("unsupported conversion: {from} -> {to}")]
    Unsupported { from: String, to: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("conversion failed: {0}")]
    Engine(String),

    #[error("staging failed: {0}")]
    Staging(#[from] std::io::Error),

    #[error("{0} pool is closed")]
    PoolClosed(Engine),

    #[error("job {0} finished without delivering a result")]
    ResultLost(Uuid),
}

impl ConvertError {
    /// Whether the caller caused this (bad format pair, bad options) as opposed to a
    /// fault on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvertError::Unsupported { .. } | ConvertError::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
