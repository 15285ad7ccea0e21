//! Hardware engine boundary.
//!
//! The daemon may talk to more than one cryptographic engine. Each engine
//! owns a bounded slot table for in-flight operations and mints opaque
//! handles the daemon stores and returns verbatim, never interprets.
//! Implementations wrap real device drivers; tests use slot-limited fakes.

use thiserror::Error;
use warden_core::EngineHandle;

/// Errors surfaced by a cryptographic engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine's operation-slot table is exhausted.
    ///
    /// The signal for slot pressure: the broker evicts the oldest pruneable
    /// operation and retries.
    #[error("engine out of operation slots")]
    OutOfSlots,

    /// The handle does not name a live operation on this engine.
    #[error("unknown engine handle: {handle}")]
    InvalidHandle {
        /// The handle the engine rejected.
        handle: EngineHandle,
    },

    /// Device-specific failure, passed through verbatim.
    #[error("device error: {code}")]
    Device {
        /// Raw device error code.
        code: i32,
    },
}

impl EngineError {
    /// True if the error reports slot exhaustion rather than a failure of
    /// the operation itself.
    #[must_use]
    pub fn is_out_of_slots(&self) -> bool {
        matches!(self, Self::OutOfSlots)
    }
}

/// One hardware-backed cryptographic engine instance.
///
/// The broker routes every call for an operation to the device that began
/// it. Handles are only meaningful to the engine that issued them.
pub trait CryptoEngine: Send + Sync {
    /// Begin an operation using the given key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutOfSlots`] when no slot is free, or a device
    /// error.
    fn begin(&self, key: &[u8]) -> Result<EngineHandle, EngineError>;

    /// Feed input to a live operation and collect its incremental output.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidHandle`] for retired handles, or a
    /// device error.
    fn update(&self, handle: EngineHandle, input: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Complete a live operation, consuming its slot and producing the final
    /// output.
    ///
    /// The slot is released whether or not the operation succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidHandle`] for retired handles, or a
    /// device error.
    fn finish(&self, handle: EngineHandle) -> Result<Vec<u8>, EngineError>;

    /// Abort a live operation, releasing its slot without output.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidHandle`] for retired handles, or a
    /// device error.
    fn abort(&self, handle: EngineHandle) -> Result<(), EngineError>;
}
