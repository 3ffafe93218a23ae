//! Top-level error for control-plane operations.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::model::{ResourceId, ValidationError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("resource {0} is not active")]
    InactiveResource(ResourceId),

    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => GatewayError::NotFound { kind, id },
            StoreError::Invalid(v) => GatewayError::Validation(v),
            other => GatewayError::Store(other.to_string()),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
