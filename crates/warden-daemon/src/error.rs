//! Broker error types.

use thiserror::Error;
use warden_core::{DeviceId, OperationError};

use crate::engine::EngineError;

/// Errors from broker request handling.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The engine rejected the request.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The operation table rejected the request.
    #[error("operation table error: {0}")]
    Table(#[from] OperationError),

    /// The device id does not name a configured engine.
    #[error("unknown device: {device}")]
    UnknownDevice {
        /// The device id that failed to resolve.
        device: DeviceId,
    },
}

impl BrokerError {
    /// True if the request failed because the token was unknown, i.e. the
    /// client raced a removal or holds a stale token.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Table(err) if err.is_not_found())
    }
}
