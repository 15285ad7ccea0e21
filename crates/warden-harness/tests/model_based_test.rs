//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! operation table behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<TableOp>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelTable    OperationTable    Compare
//!      (reference)   (real, locked)    Observables
//! ```

use std::sync::Arc;

use proptest::prelude::*;
use warden_core::{
    ClientHandle, DeathNotifier, DeviceId, EngineHandle, OperationTable, OperationToken,
};
use warden_harness::{ModelTable, RecordingNotifier, TableOp, model::key_bytes};

/// Number of distinct clients random sequences draw from.
const NUM_CLIENTS: u8 = 4;

/// Real table plus reference model, kept in lock-step.
struct World {
    notifier: Arc<RecordingNotifier>,
    table: OperationTable,
    model: ModelTable,
    /// Tokens that were removed and must stay not-found forever.
    stale: Vec<OperationToken>,
    next_engine_handle: u64,
}

impl World {
    fn new() -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let table = OperationTable::new(Arc::clone(&notifier) as Arc<dyn DeathNotifier>);
        Self {
            notifier,
            table,
            model: ModelTable::new(),
            stale: Vec::new(),
            next_engine_handle: 0,
        }
    }

    fn client(raw: u8) -> ClientHandle {
        ClientHandle::new(u64::from(raw % NUM_CLIENTS))
    }

    fn apply(&mut self, op: &TableOp) -> Result<(), TestCaseError> {
        match op {
            TableOp::Register { client, pruneable, key_seed } => {
                let client = Self::client(*client);
                let key = key_bytes(*key_seed);
                let handle = EngineHandle::new(self.next_engine_handle);
                self.next_engine_handle += 1;

                let token = self
                    .table
                    .register(handle, DeviceId::new(0), client, &key, *pruneable)
                    .map_err(|e| TestCaseError::fail(format!("register failed: {e}")))?;
                self.model.track(token, client, key, *pruneable);
            },

            TableOp::Lookup { index } => {
                let live = self.model.live_tokens();
                if live.is_empty() {
                    return Ok(());
                }
                let token = live[usize::from(*index) % live.len()];

                let snapshot = self
                    .table
                    .lookup(token)
                    .map_err(|e| TestCaseError::fail(format!("lookup failed: {e}")))?;
                let expected = self.model.lookup(token);
                let expected = expected.ok_or_else(|| TestCaseError::fail("model lost token"))?;
                prop_assert_eq!(snapshot.key_material.as_bytes(), expected.key.as_slice());
            },

            TableOp::LookupHandle { index } => {
                let live = self.model.live_tokens();
                if live.is_empty() {
                    return Ok(());
                }
                let token = live[usize::from(*index) % live.len()];

                self.table
                    .lookup_handle(token)
                    .map_err(|e| TestCaseError::fail(format!("lookup_handle failed: {e}")))?;
                self.model.lookup(token);
            },

            TableOp::Remove { index } => {
                let live = self.model.live_tokens();
                if live.is_empty() {
                    return Ok(());
                }
                let token = live[usize::from(*index) % live.len()];

                self.table
                    .remove(token)
                    .map_err(|e| TestCaseError::fail(format!("remove failed: {e}")))?;
                prop_assert!(self.model.remove(token));
                self.stale.push(token);
            },

            TableOp::LookupStale => {
                if let Some(token) = self.stale.last().copied() {
                    let err = self.table.lookup(token);
                    prop_assert!(err.is_err_and(|e| e.is_not_found()));
                }
            },

            TableOp::RemoveStale => {
                if let Some(token) = self.stale.last().copied() {
                    let err = self.table.remove(token);
                    prop_assert!(err.is_err_and(|e| e.is_not_found()));
                }
            },

            TableOp::ClientDeath { client } => {
                let client = Self::client(*client);
                let doomed = self.model.operations_for_client(client);

                let removed = self.table.on_client_death(client);
                let expected = self.model.client_death(client);
                prop_assert_eq!(removed, expected);
                self.stale.extend(doomed);
            },
        }

        self.check()
    }

    /// Compare every observable of the real table against the model.
    fn check(&self) -> Result<(), TestCaseError> {
        prop_assert_eq!(self.table.len(), self.model.len());
        prop_assert_eq!(self.table.is_empty(), self.model.is_empty());
        prop_assert_eq!(self.table.has_pruneable(), self.model.has_pruneable());
        prop_assert_eq!(self.table.oldest_pruneable(), self.model.oldest_pruneable());

        for raw in 0..NUM_CLIENTS {
            let client = ClientHandle::new(u64::from(raw));
            prop_assert_eq!(
                self.table.operations_for_client(client),
                self.model.operations_for_client(client)
            );
            // I3: the death watch is active exactly for clients with live
            // operations.
            prop_assert_eq!(
                self.notifier.is_watched(client),
                !self.model.operations_for_client(client).is_empty()
            );
        }

        // Removed tokens stay removed (tokens are never reused).
        for token in &self.stale {
            prop_assert!(self.table.lookup_handle(*token).is_err());
        }

        // The table never diverges internally.
        prop_assert_eq!(self.table.integrity_faults(), 0);
        Ok(())
    }
}

/// Strategy for generating operations.
fn op_strategy() -> impl Strategy<Value = TableOp> {
    let client = any::<u8>();
    let index = any::<u8>();

    prop_oneof![
        4 => (client, any::<bool>(), any::<u8>()).prop_map(|(client, pruneable, key_seed)| {
            TableOp::Register { client, pruneable, key_seed }
        }),
        3 => index.prop_map(|index| TableOp::Lookup { index }),
        1 => index.prop_map(|index| TableOp::LookupHandle { index }),
        2 => index.prop_map(|index| TableOp::Remove { index }),
        1 => Just(TableOp::LookupStale),
        1 => Just(TableOp::RemoveStale),
        1 => client.prop_map(|client| TableOp::ClientDeath { client }),
    ]
}

proptest! {
    /// The real table and the reference model agree on every observable
    /// after every operation.
    #[test]
    fn prop_model_matches_real(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        let mut world = World::new();
        for op in &ops {
            world.apply(op)?;
        }
    }

    /// Draining a client one way or another always balances its death-watch
    /// registrations.
    #[test]
    fn prop_watch_pairing_balances(
        ops in proptest::collection::vec(op_strategy(), 1..60),
        finish_by_death in any::<bool>(),
    ) {
        let mut world = World::new();
        for op in &ops {
            world.apply(op)?;
        }

        // Drain everything that is still live.
        if finish_by_death {
            for raw in 0..NUM_CLIENTS {
                world.apply(&TableOp::ClientDeath { client: raw })?;
            }
        } else {
            while !world.model.is_empty() {
                world.apply(&TableOp::Remove { index: 0 })?;
            }
        }

        for raw in 0..NUM_CLIENTS {
            let client = ClientHandle::new(u64::from(raw));
            prop_assert!(!world.notifier.is_watched(client));
            prop_assert_eq!(
                world.notifier.registrations(client),
                world.notifier.deregistrations(client)
            );
        }
    }

    /// Tokens registered with `pruneable = false` never surface as the
    /// eviction candidate.
    #[test]
    fn prop_non_pruneable_never_candidate(
        seeds in proptest::collection::vec((any::<u8>(), any::<bool>()), 1..30)
    ) {
        let mut world = World::new();
        let mut pinned = Vec::new();

        for (seed, pruneable) in &seeds {
            let before = world.model.live_tokens();
            world.apply(&TableOp::Register {
                client: *seed,
                pruneable: *pruneable,
                key_seed: *seed,
            })?;
            if !pruneable {
                let after = world.model.live_tokens();
                if let Some(token) = after.iter().find(|t| !before.contains(t)) {
                    pinned.push(*token);
                }
            }
        }

        for (i, _) in seeds.iter().enumerate() {
            world.apply(&TableOp::Lookup { index: i as u8 })?;
            if let Some(candidate) = world.table.oldest_pruneable() {
                prop_assert!(!pinned.contains(&candidate));
            }
        }
    }
}

mod smoke_tests {
    use super::*;

    /// Basic lock-step sanity check without proptest in the loop.
    #[test]
    fn world_basic_sequence() {
        let mut world = World::new();

        let script = [
            TableOp::Register { client: 0, pruneable: true, key_seed: 1 },
            TableOp::Register { client: 0, pruneable: false, key_seed: 2 },
            TableOp::Register { client: 1, pruneable: true, key_seed: 3 },
            TableOp::Lookup { index: 0 },
            TableOp::Remove { index: 1 },
            TableOp::RemoveStale,
            TableOp::ClientDeath { client: 0 },
            TableOp::ClientDeath { client: 1 },
        ];

        for op in &script {
            world.apply(op).unwrap();
        }

        assert!(world.table.is_empty());
        assert!(world.model.is_empty());
    }
}
