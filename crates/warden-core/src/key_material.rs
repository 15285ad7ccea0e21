//! Owned key-material buffers.
//!
//! The table holds exactly one copy of the key bytes per live operation and
//! hands out independent copies on lookup. `KeyMaterial` is move-only: it is
//! created by deep copy, duplicated only through the explicit fallible
//! [`KeyMaterial::try_clone`], and zeroized when dropped. Release-exactly-once
//! is therefore a property of ownership, not of call-site discipline.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::OperationError;

/// Owned byte buffer holding one copy of an operation's key material.
///
/// The bytes are wiped when the buffer is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
}

impl KeyMaterial {
    /// Deep-copy `bytes` into a newly owned buffer.
    ///
    /// The source slice stays with the caller; the copy is independent of it.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Allocation`] if the copy cannot be allocated.
    pub fn copy_from(bytes: &[u8]) -> Result<Self, OperationError> {
        let mut owned = Vec::new();
        owned.try_reserve_exact(bytes.len())?;
        owned.extend_from_slice(bytes);
        Ok(Self { bytes: owned })
    }

    /// Produce an independent copy of this buffer.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Allocation`] if the copy cannot be allocated.
    pub fn try_clone(&self) -> Result<Self, OperationError> {
        Self::copy_from(&self.bytes)
    }

    /// Borrow the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable access to the key bytes.
    ///
    /// Only meaningful on copies the caller owns; the table never mutates its
    /// own copy.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Number of bytes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key bytes.
        f.debug_struct("KeyMaterial").field("len", &self.bytes.len()).finish_non_exhaustive()
    }
}
