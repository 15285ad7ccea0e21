//! Fuzz target for the [`OperationTable`]
//!
//! Prevent index divergence and key-material leaks via arbitrary operation
//! interleavings
//!
//! # Strategy
//!
//! - Operation sequences: arbitrary register/lookup/remove/death orderings
//! - Stale tokens: lookups and removals of already-removed tokens
//! - Client churn: deaths for clients with zero, one, and many operations
//!
//! # Invariants
//!
//! - The table and the reference model agree on every observable after every
//!   operation
//! - Removed tokens are NEVER found again (tokens are not reused)
//! - Death-watch registrations balance: watched set == clients with live
//!   operations
//! - `integrity_faults` stays zero
//! - NEVER panic on any operation sequence

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use warden_core::{ClientHandle, DeviceId, EngineHandle, OperationTable, OperationToken};
use warden_harness::{ModelTable, RecordingNotifier, TableOp, model::key_bytes};

/// Fuzz input: a sequence of table operations.
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    ops: Vec<TableOp>,
}

fuzz_target!(|input: FuzzInput| {
    let notifier = Arc::new(RecordingNotifier::new());
    let table = OperationTable::new(Arc::clone(&notifier) as _);
    let mut model = ModelTable::new();
    let mut stale: Vec<OperationToken> = Vec::new();
    let mut next_handle = 0u64;

    for op in input.ops {
        match op {
            TableOp::Register { client, pruneable, key_seed } => {
                let client = ClientHandle::new(u64::from(client % 8));
                let key = key_bytes(key_seed);
                let handle = EngineHandle::new(next_handle);
                next_handle += 1;

                let token = table
                    .register(handle, DeviceId::new(0), client, &key, pruneable)
                    .unwrap_or_else(|e| panic!("register must not fail: {e}"));
                model.track(token, client, key, pruneable);
            },

            TableOp::Lookup { index } => {
                let live = model.live_tokens();
                if live.is_empty() {
                    continue;
                }
                let token = live[usize::from(index) % live.len()];

                let snapshot =
                    table.lookup(token).unwrap_or_else(|e| panic!("live lookup failed: {e}"));
                let expected = model.lookup(token).unwrap_or_else(|| panic!("model lost token"));
                assert_eq!(snapshot.key_material.as_bytes(), expected.key.as_slice());
            },

            TableOp::LookupHandle { index } => {
                let live = model.live_tokens();
                if live.is_empty() {
                    continue;
                }
                let token = live[usize::from(index) % live.len()];

                assert!(table.lookup_handle(token).is_ok());
                model.lookup(token);
            },

            TableOp::Remove { index } => {
                let live = model.live_tokens();
                if live.is_empty() {
                    continue;
                }
                let token = live[usize::from(index) % live.len()];

                table.remove(token).unwrap_or_else(|e| panic!("live remove failed: {e}"));
                assert!(model.remove(token));
                stale.push(token);
            },

            TableOp::LookupStale => {
                if let Some(token) = stale.last().copied() {
                    assert!(table.lookup(token).is_err());
                }
            },

            TableOp::RemoveStale => {
                if let Some(token) = stale.last().copied() {
                    assert!(table.remove(token).is_err());
                }
            },

            TableOp::ClientDeath { client } => {
                let client = ClientHandle::new(u64::from(client % 8));
                let doomed = model.operations_for_client(client);

                let removed = table.on_client_death(client);
                assert_eq!(removed, model.client_death(client));
                stale.extend(doomed);
            },
        }

        // Observables must agree with the model after every step.
        assert_eq!(table.len(), model.len());
        assert_eq!(table.has_pruneable(), model.has_pruneable());
        assert_eq!(table.oldest_pruneable(), model.oldest_pruneable());
        for raw in 0..8u64 {
            let client = ClientHandle::new(raw);
            assert_eq!(table.operations_for_client(client), model.operations_for_client(client));
            assert_eq!(
                notifier.is_watched(client),
                !model.operations_for_client(client).is_empty(),
                "death watch must be active exactly for clients with live operations"
            );
        }
        for token in &stale {
            assert!(table.lookup_handle(*token).is_err(), "removed token resurfaced");
        }
        assert_eq!(table.integrity_faults(), 0, "table reported internal divergence");
    }
});
