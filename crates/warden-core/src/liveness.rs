//! Client-liveness capability.
//!
//! The table registers interest in a client's death when the client's first
//! operation appears and releases that interest when the last one goes away.
//! The transport that actually delivers death notifications (connection
//! teardown hooks, process-exit watchers, ...) lives outside this crate;
//! this trait is the registration contract against it, injected so the table
//! can be tested with a recording fake.

use crate::handle::ClientHandle;

/// Capability for registering and deregistering interest in client death.
///
/// # Contract
///
/// - The table calls [`register_for_death`](Self::register_for_death) exactly
///   once when a client's first operation is registered, and
///   [`deregister_for_death`](Self::deregister_for_death) exactly once after
///   its last operation is removed.
/// - Both calls are made with no table lock held, so implementations may call
///   back into the table (for example to cascade a death that raced the
///   registration).
/// - Implementations must be bounded and non-blocking; the table treats both
///   calls as cheap bookkeeping.
/// - A watched client may already be dead by the time registration completes.
///   The implementation must still deliver the death notification; the
///   resulting cascade removes whatever the client owns at that point.
pub trait DeathNotifier: Send + Sync {
    /// Start watching `client` for death.
    fn register_for_death(&self, client: ClientHandle);

    /// Stop watching `client`.
    fn deregister_for_death(&self, client: ClientHandle);
}
