//! Operation Table
//!
//! Tracks every in-flight engine operation behind a caller-facing token.
//!
//! ## Responsibilities
//!
//! - Token Indirection: mint unforgeable tokens in place of raw engine
//!   handles
//! - LRU Ordering: keep pruneable operations ordered by last use so slot
//!   pressure can reclaim the coldest one
//! - Client Tracking: index operations per client and cascade cleanup when a
//!   client dies
//! - Key Custody: own exactly one copy of each operation's key material and
//!   hand out independent copies on lookup
//!
//! ## Design
//!
//! - Self-synchronizing: one mutex around the whole state, so every logical
//!   operation is a single critical section and racing lookups and removals
//!   observe full presence or not-found, never partial state
//! - Injected liveness: death-watch registration goes through the
//!   [`DeathNotifier`] capability and is always invoked with the lock
//!   released
//! - Policy-free eviction: the table only exposes the oldest pruneable
//!   candidate; deciding when to evict and aborting the engine operation are
//!   the caller's job

use std::{
    collections::{HashMap, HashSet, hash_map::Entry},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    error::OperationError,
    handle::{ClientHandle, DeviceId, EngineHandle, OperationToken},
    key_material::KeyMaterial,
    liveness::DeathNotifier,
};

/// One live operation record.
struct Operation {
    /// Handle issued by the engine; stored verbatim.
    engine_handle: EngineHandle,
    /// Engine instance that issued the handle.
    device: DeviceId,
    /// The table's own copy of the key bytes. Dropped (and wiped) exactly
    /// once, when the record leaves the table.
    key: KeyMaterial,
    /// Client that initiated the operation.
    owner: ClientHandle,
}

/// Everything a successful [`OperationTable::lookup`] produces.
#[derive(Debug)]
pub struct OperationSnapshot {
    /// Handle issued by the engine when the operation began.
    pub engine_handle: EngineHandle,
    /// Engine instance that issued the handle.
    pub device: DeviceId,
    /// Fresh copy of the key bytes; the caller owns it outright and mutating
    /// it cannot affect the table's copy.
    pub key_material: KeyMaterial,
}

/// Mutable table state. Only ever touched behind [`OperationTable::lock`].
struct TableState {
    /// Every live operation, keyed by its token.
    by_token: HashMap<OperationToken, Operation>,
    /// Pruneable tokens, oldest first. Exactly the live tokens registered
    /// with `pruneable = true`, no duplicates.
    lru: Vec<OperationToken>,
    /// Tokens per owning client, in registration order. An entry exists iff
    /// the client has at least one live operation.
    by_client: HashMap<ClientHandle, Vec<OperationToken>>,
    /// Clients whose death watch is currently claimed. Mirrors `by_client`
    /// keys, except during the register window where the watch is claimed
    /// just before the first operation is inserted.
    watched: HashSet<ClientHandle>,
    /// Next token value. Monotonic; tokens are never reused.
    next_token: u64,
    /// Count of observed bookkeeping divergences. Always zero unless the
    /// table itself has a bug.
    integrity_faults: u64,
}

impl TableState {
    fn new() -> Self {
        Self {
            by_token: HashMap::new(),
            lru: Vec::new(),
            by_client: HashMap::new(),
            watched: HashSet::new(),
            next_token: 0,
            integrity_faults: 0,
        }
    }

    fn mint(&mut self) -> OperationToken {
        let token = OperationToken::mint(self.next_token);
        self.next_token += 1;
        token
    }

    /// Move `token` to the most-recently-used end if it is pruneable.
    ///
    /// An operation that is actively in use must not be the pruning target.
    fn touch(&mut self, token: OperationToken) {
        if let Some(pos) = self.lru.iter().position(|t| *t == token) {
            self.lru.remove(pos);
            self.lru.push(token);
        }
    }

    /// Delete `token` and every index entry pointing at it.
    ///
    /// Returns the owning client if this was its last live operation, i.e.
    /// the caller must release the client's death watch once the lock is
    /// dropped.
    fn remove_locked(
        &mut self,
        token: OperationToken,
    ) -> Result<Option<ClientHandle>, OperationError> {
        let Some(op) = self.by_token.remove(&token) else {
            return Err(OperationError::NotFound { token });
        };
        // `op.key` is dropped (and zeroized) with `op` when this scope ends.

        if let Some(pos) = self.lru.iter().position(|t| *t == token) {
            self.lru.remove(pos);
        }

        let owner = op.owner;
        let owner_drained = match self.by_client.get_mut(&owner) {
            Some(tokens) => {
                tokens.retain(|t| *t != token);
                tokens.is_empty()
            },
            None => {
                // The client index and the operation map diverged. Complete
                // the removal anyway so the record cannot leak, but report
                // it: this is a bug in the table, not a caller error.
                self.integrity_faults += 1;
                tracing::error!(%token, client = %owner, "operation owner missing from client index");
                false
            },
        };

        if owner_drained {
            self.by_client.remove(&owner);
            self.watched.remove(&owner);
            return Ok(Some(owner));
        }

        Ok(None)
    }
}

/// Self-synchronizing table of in-flight engine operations.
///
/// All methods take `&self`; the table serializes every logical operation
/// internally rather than assuming a caller-held lock.
pub struct OperationTable {
    state: Mutex<TableState>,
    notifier: Arc<dyn DeathNotifier>,
}

impl OperationTable {
    /// Create an empty table wired to the given liveness capability.
    #[must_use]
    pub fn new(notifier: Arc<dyn DeathNotifier>) -> Self {
        Self { state: Mutex::new(TableState::new()), notifier }
    }

    /// Lock the state, recovering from poisoning.
    ///
    /// State is only mutated in panic-free sections, so a poisoned mutex
    /// still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly begun engine operation and mint its token.
    ///
    /// The key bytes are deep-copied; the caller keeps ownership of the
    /// slice it passed in. If `pruneable` is true the operation enters the
    /// LRU order as most-recently-used. The client's death watch is claimed
    /// before the operation becomes visible: exactly one register call per
    /// client lifecycle performs the [`DeathNotifier`] registration, and the
    /// notifier is always invoked with the lock released.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Allocation`] if the key copy or the table
    /// growth cannot be allocated. Nothing is registered in that case, and a
    /// death watch claimed for a first operation is released again.
    pub fn register(
        &self,
        engine_handle: EngineHandle,
        device: DeviceId,
        client: ClientHandle,
        key_material: &[u8],
        pruneable: bool,
    ) -> Result<OperationToken, OperationError> {
        let key = KeyMaterial::copy_from(key_material)?;

        let newly_watched = {
            let mut state = self.lock();
            state.watched.try_reserve(1)?;
            state.watched.insert(client)
        };
        if newly_watched {
            self.notifier.register_for_death(client);
        }

        match self.insert_operation(engine_handle, device, client, key, pruneable) {
            Ok(token) => Ok(token),
            Err(err) => {
                // A failed registration must not leave a dangling death
                // watch behind, unless another operation claimed it
                // concurrently.
                let release = {
                    let mut state = self.lock();
                    !state.by_client.contains_key(&client) && state.watched.remove(&client)
                };
                if release {
                    self.notifier.deregister_for_death(client);
                }
                Err(err)
            },
        }
    }

    fn insert_operation(
        &self,
        engine_handle: EngineHandle,
        device: DeviceId,
        client: ClientHandle,
        key: KeyMaterial,
        pruneable: bool,
    ) -> Result<OperationToken, OperationError> {
        let mut state = self.lock();

        // Reserve all capacity up front so the mutations below cannot fail
        // half-way and leave partial state.
        state.by_token.try_reserve(1)?;
        if pruneable {
            state.lru.try_reserve(1)?;
        }
        state.by_client.try_reserve(1)?;
        match state.by_client.entry(client) {
            Entry::Occupied(mut occupied) => occupied.get_mut().try_reserve(1)?,
            Entry::Vacant(vacant) => {
                let mut tokens = Vec::new();
                tokens.try_reserve(1)?;
                vacant.insert(tokens);
            },
        }

        let token = state.mint();
        state.by_token.insert(token, Operation { engine_handle, device, key, owner: client });
        if pruneable {
            state.lru.push(token);
        }
        if let Some(tokens) = state.by_client.get_mut(&client) {
            tokens.push(token);
        }

        Ok(token)
    }

    /// Look up an operation and refresh its recency.
    ///
    /// Produces the engine handle, the issuing device, and an independently
    /// owned copy of the key material. If the token is pruneable it moves to
    /// the most-recently-used end of the LRU order.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotFound`] for unknown tokens and
    /// [`OperationError::Allocation`] if the key copy cannot be allocated
    /// (the table's own copy is untouched either way).
    pub fn lookup(&self, token: OperationToken) -> Result<OperationSnapshot, OperationError> {
        let mut state = self.lock();
        let Some(op) = state.by_token.get(&token) else {
            return Err(OperationError::NotFound { token });
        };

        let snapshot = OperationSnapshot {
            engine_handle: op.engine_handle,
            device: op.device,
            key_material: op.key.try_clone()?,
        };
        state.touch(token);
        Ok(snapshot)
    }

    /// Look up only the engine-facing identifiers, skipping the key copy.
    ///
    /// Same recency refresh as [`lookup`](Self::lookup); for callers that
    /// route to the engine and do not need the key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotFound`] for unknown tokens.
    pub fn lookup_handle(
        &self,
        token: OperationToken,
    ) -> Result<(EngineHandle, DeviceId), OperationError> {
        let mut state = self.lock();
        let Some(op) = state.by_token.get(&token) else {
            return Err(OperationError::NotFound { token });
        };

        let ids = (op.engine_handle, op.device);
        state.touch(token);
        Ok(ids)
    }

    /// Remove an operation, releasing its key-material copy.
    ///
    /// Drops the token from the LRU order if present and from the owning
    /// client's list. Removing the client's last operation releases its
    /// death watch exactly once, with the lock released.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotFound`] for unknown tokens, with no state
    /// mutated.
    pub fn remove(&self, token: OperationToken) -> Result<(), OperationError> {
        let released = {
            let mut state = self.lock();
            state.remove_locked(token)?
        };
        if let Some(client) = released {
            self.notifier.deregister_for_death(client);
        }
        Ok(())
    }

    /// Cascade-remove every operation owned by a dead client.
    ///
    /// This is the callback entry point for the liveness collaborator. The
    /// whole cascade runs as one critical section; the client's death watch
    /// is released afterwards, exactly once, by virtue of the last removal
    /// emptying its index entry. Returns the number of operations removed
    /// (zero if the client owned none).
    pub fn on_client_death(&self, client: ClientHandle) -> usize {
        let (removed, released) = {
            let mut state = self.lock();
            let tokens = state.by_client.get(&client).cloned().unwrap_or_default();
            let mut removed = 0usize;
            let mut released = None;
            for token in tokens {
                match state.remove_locked(token) {
                    Ok(owner) => {
                        removed += 1;
                        if owner.is_some() {
                            released = owner;
                        }
                    },
                    Err(_) => {
                        // Listed in the client index but absent from the
                        // operation map: the indexes diverged.
                        state.integrity_faults += 1;
                        tracing::error!(%token, client = %client, "client index lists unknown token");
                    },
                }
            }
            (removed, released)
        };

        if removed > 0 {
            tracing::debug!(client = %client, removed, "cascaded removal for dead client");
        }
        if let Some(client) = released {
            self.notifier.deregister_for_death(client);
        }
        removed
    }

    /// True iff at least one pruneable operation is live.
    #[must_use]
    pub fn has_pruneable(&self) -> bool {
        !self.lock().lru.is_empty()
    }

    /// The least-recently-used pruneable token, if any.
    ///
    /// The token stays in the table; the caller that owns eviction policy
    /// must abort the engine operation and then call
    /// [`remove`](Self::remove).
    #[must_use]
    pub fn oldest_pruneable(&self) -> Option<OperationToken> {
        self.lock().lru.first().copied()
    }

    /// The client's live operations in registration order.
    ///
    /// Empty if the client owns none.
    #[must_use]
    pub fn operations_for_client(&self, client: ClientHandle) -> Vec<OperationToken> {
        self.lock().by_client.get(&client).cloned().unwrap_or_default()
    }

    /// Number of live operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().by_token.len()
    }

    /// True if no operations are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().by_token.is_empty()
    }

    /// Number of bookkeeping divergences observed since construction.
    ///
    /// Exposed as a metric; any non-zero value indicates a bug in the table
    /// itself and should be investigated, not retried.
    #[must_use]
    pub fn integrity_faults(&self) -> u64 {
        self.lock().integrity_faults
    }
}

impl std::fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("OperationTable")
            .field("operations", &state.by_token.len())
            .field("pruneable", &state.lru.len())
            .field("clients", &state.by_client.len())
            .field("integrity_faults", &state.integrity_faults)
            .finish()
    }
}
