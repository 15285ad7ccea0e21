//! Fake collaborators for table and broker tests.

use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use warden_core::{ClientHandle, DeathNotifier, EngineHandle};
use warden_daemon::{CryptoEngine, EngineError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every liveness call so tests can assert the exactly-once pairing.
#[derive(Default)]
pub struct RecordingNotifier {
    state: Mutex<NotifierState>,
}

#[derive(Default)]
struct NotifierState {
    watched: HashSet<ClientHandle>,
    log: Vec<(ClientHandle, bool)>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `client` was registered.
    #[must_use]
    pub fn registrations(&self, client: ClientHandle) -> usize {
        lock(&self.state).log.iter().filter(|(c, reg)| *c == client && *reg).count()
    }

    /// How many times `client` was deregistered.
    #[must_use]
    pub fn deregistrations(&self, client: ClientHandle) -> usize {
        lock(&self.state).log.iter().filter(|(c, reg)| *c == client && !*reg).count()
    }

    /// True if `client` is currently watched.
    #[must_use]
    pub fn is_watched(&self, client: ClientHandle) -> bool {
        lock(&self.state).watched.contains(&client)
    }

    /// The set of currently watched clients.
    #[must_use]
    pub fn watched(&self) -> HashSet<ClientHandle> {
        lock(&self.state).watched.clone()
    }
}

impl DeathNotifier for RecordingNotifier {
    fn register_for_death(&self, client: ClientHandle) {
        let mut state = lock(&self.state);
        state.watched.insert(client);
        state.log.push((client, true));
    }

    fn deregister_for_death(&self, client: ClientHandle) {
        let mut state = lock(&self.state);
        state.watched.remove(&client);
        state.log.push((client, false));
    }
}

/// Slot-limited fake engine.
///
/// Mints sequential handles, tracks which are live, and reports
/// [`EngineError::OutOfSlots`] once `capacity` operations are in flight.
/// `update` echoes its input; `finish` returns a fixed marker.
pub struct SlotEngine {
    capacity: usize,
    state: Mutex<SlotEngineState>,
}

#[derive(Default)]
struct SlotEngineState {
    next_handle: u64,
    live: Vec<EngineHandle>,
    aborted: Vec<EngineHandle>,
}

impl SlotEngine {
    /// Create a fake engine with the given slot capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity, state: Mutex::new(SlotEngineState::default()) }
    }

    /// Number of operations currently holding a slot.
    #[must_use]
    pub fn live_count(&self) -> usize {
        lock(&self.state).live.len()
    }

    /// Handles aborted so far, in order.
    #[must_use]
    pub fn aborted(&self) -> Vec<EngineHandle> {
        lock(&self.state).aborted.clone()
    }
}

impl CryptoEngine for SlotEngine {
    fn begin(&self, _key: &[u8]) -> Result<EngineHandle, EngineError> {
        let mut state = lock(&self.state);
        if state.live.len() >= self.capacity {
            return Err(EngineError::OutOfSlots);
        }
        let handle = EngineHandle::new(state.next_handle);
        state.next_handle += 1;
        state.live.push(handle);
        Ok(handle)
    }

    fn update(&self, handle: EngineHandle, input: &[u8]) -> Result<Vec<u8>, EngineError> {
        if !lock(&self.state).live.contains(&handle) {
            return Err(EngineError::InvalidHandle { handle });
        }
        Ok(input.to_vec())
    }

    fn finish(&self, handle: EngineHandle) -> Result<Vec<u8>, EngineError> {
        let mut state = lock(&self.state);
        let Some(pos) = state.live.iter().position(|h| *h == handle) else {
            return Err(EngineError::InvalidHandle { handle });
        };
        state.live.remove(pos);
        Ok(b"done".to_vec())
    }

    fn abort(&self, handle: EngineHandle) -> Result<(), EngineError> {
        let mut state = lock(&self.state);
        let Some(pos) = state.live.iter().position(|h| *h == handle) else {
            return Err(EngineError::InvalidHandle { handle });
        };
        state.live.remove(pos);
        state.aborted.push(handle);
        Ok(())
    }
}
