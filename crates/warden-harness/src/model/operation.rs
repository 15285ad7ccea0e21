//! Operations for model-based testing.
//!
//! Operations represent all externally reachable actions against the table.
//! They are generated randomly (proptest strategies in the tests, arbitrary
//! derive for the fuzzer) and applied to both the model and the real table.

use arbitrary::Arbitrary;

/// Client identifier (small space so sequences revisit clients).
pub type ModelClientId = u8;

/// Operations that can be applied to the table.
///
/// Live tokens are addressed by index rather than value so that randomly
/// generated sequences mostly hit real tokens; stale-token paths are
/// exercised by the dedicated `RemoveStale`/`LookupStale` variants.
#[derive(Debug, Clone, Arbitrary)]
pub enum TableOp {
    /// Register a new operation for a client.
    Register {
        /// Owning client.
        client: ModelClientId,
        /// Whether the operation enters the LRU order.
        pruneable: bool,
        /// Seed expanded into key bytes.
        key_seed: u8,
    },

    /// Look up the n-th live token (modulo the live count).
    Lookup {
        /// Index into the live-token list.
        index: u8,
    },

    /// Handle-only lookup of the n-th live token.
    LookupHandle {
        /// Index into the live-token list.
        index: u8,
    },

    /// Remove the n-th live token.
    Remove {
        /// Index into the live-token list.
        index: u8,
    },

    /// Look up a token that was already removed.
    LookupStale,

    /// Remove a token that was already removed.
    RemoveStale,

    /// Deliver a death notification for a client.
    ClientDeath {
        /// The client that died.
        client: ModelClientId,
    },
}

/// Expand a key seed into deterministic key bytes.
#[must_use]
pub fn key_bytes(seed: u8) -> Vec<u8> {
    (0..16u8).map(|i| seed.wrapping_add(i)).collect()
}
