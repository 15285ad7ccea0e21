//! Operation broker.
//!
//! Owns the caller-facing request surface (begin, update, finish, abort) and
//! the slot-pressure policy the table deliberately does not have: when an
//! engine reports it is out of slots, the broker aborts the least-recently
//! used pruneable operation and retries. The table stays pure bookkeeping;
//! every engine call lives here.

use std::sync::Arc;

use warden_core::{ClientHandle, DeviceId, OperationTable, OperationToken};

use crate::{
    engine::{CryptoEngine, EngineError},
    error::BrokerError,
};

/// Brokers client requests between the operation table and the configured
/// engine devices.
pub struct OperationBroker {
    /// Shared operation table.
    table: Arc<OperationTable>,
    /// Engine instances, indexed by [`DeviceId`].
    devices: Vec<Arc<dyn CryptoEngine>>,
}

impl OperationBroker {
    /// Create a broker over the given table and devices.
    ///
    /// Device order is significant: `devices[n]` serves `DeviceId::new(n)`.
    #[must_use]
    pub fn new(table: Arc<OperationTable>, devices: Vec<Arc<dyn CryptoEngine>>) -> Self {
        Self { table, devices }
    }

    /// The shared operation table.
    #[must_use]
    pub fn table(&self) -> &Arc<OperationTable> {
        &self.table
    }

    fn device(&self, device: DeviceId) -> Result<&Arc<dyn CryptoEngine>, BrokerError> {
        self.devices.get(device.index()).ok_or(BrokerError::UnknownDevice { device })
    }

    /// Begin an operation for `client` on `device`, evicting under slot
    /// pressure.
    ///
    /// While the engine reports [`EngineError::OutOfSlots`], the oldest
    /// pruneable operation is aborted and retired, then the begin is
    /// retried. The loop ends when the engine admits the operation or no
    /// pruneable candidate remains.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutOfSlots`] (wrapped) once no candidate is
    /// left to evict, any other engine error verbatim, or a table error from
    /// registration. A registration failure aborts the freshly begun engine
    /// operation so the slot cannot leak.
    pub fn begin_operation(
        &self,
        device: DeviceId,
        client: ClientHandle,
        key_material: &[u8],
        pruneable: bool,
    ) -> Result<OperationToken, BrokerError> {
        let engine = self.device(device)?;

        let handle = loop {
            match engine.begin(key_material) {
                Ok(handle) => break handle,
                Err(EngineError::OutOfSlots) => {
                    if !self.evict_oldest()? {
                        return Err(EngineError::OutOfSlots.into());
                    }
                },
                Err(err) => return Err(err.into()),
            }
        };

        match self.table.register(handle, device, client, key_material, pruneable) {
            Ok(token) => {
                tracing::debug!(%token, %client, %device, "operation registered");
                Ok(token)
            },
            Err(err) => {
                if let Err(abort_err) = engine.abort(handle) {
                    tracing::warn!(%handle, error = %abort_err, "abort after failed registration");
                }
                Err(err.into())
            },
        }
    }

    /// Feed input to a live operation.
    ///
    /// Refreshes the operation's recency, so an actively used operation is
    /// never the next pruning target.
    ///
    /// # Errors
    ///
    /// Returns not-found for stale tokens or the engine's error verbatim.
    pub fn update_operation(
        &self,
        token: OperationToken,
        input: &[u8],
    ) -> Result<Vec<u8>, BrokerError> {
        let (handle, device) = self.table.lookup_handle(token)?;
        let output = self.device(device)?.update(handle, input)?;
        Ok(output)
    }

    /// Complete a live operation and retire it.
    ///
    /// The record is retired whether or not the engine accepts the finish: a
    /// failed finish still consumed the hardware slot, so keeping the token
    /// alive would leak the key-material copy.
    ///
    /// # Errors
    ///
    /// Returns not-found for stale tokens or the engine's error verbatim.
    pub fn finish_operation(&self, token: OperationToken) -> Result<Vec<u8>, BrokerError> {
        let (handle, device) = self.table.lookup_handle(token)?;
        let result = self.device(device)?.finish(handle);
        self.table.remove(token)?;

        let output = result?;
        tracing::debug!(%token, "operation finished");
        Ok(output)
    }

    /// Abort a live operation and retire it.
    ///
    /// # Errors
    ///
    /// Returns not-found for stale tokens. An engine abort failure is logged
    /// but does not keep the record alive.
    pub fn abort_operation(&self, token: OperationToken) -> Result<(), BrokerError> {
        let (handle, device) = self.table.lookup_handle(token)?;
        if let Err(err) = self.device(device)?.abort(handle) {
            tracing::warn!(%token, error = %err, "engine abort failed");
        }
        self.table.remove(token)?;
        tracing::debug!(%token, "operation aborted");
        Ok(())
    }

    /// Abort and retire the least-recently-used pruneable operation.
    ///
    /// Returns false when no pruneable candidate exists.
    ///
    /// # Errors
    ///
    /// Returns a table error if the candidate disappears mid-eviction.
    pub fn evict_oldest(&self) -> Result<bool, BrokerError> {
        let Some(victim) = self.table.oldest_pruneable() else {
            return Ok(false);
        };
        tracing::info!(token = %victim, "evicting least-recently-used operation");
        match self.abort_operation(victim) {
            Ok(()) => Ok(true),
            // The candidate raced a concurrent removal; the slot it held is
            // already reclaimed.
            Err(err) if err.is_not_found() => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Tear down every operation a dead client left behind.
    ///
    /// Engine-aware variant of the table's cascade: each operation is
    /// aborted against its device before the record is retired. Returns the
    /// number of operations torn down.
    pub fn handle_client_death(&self, client: ClientHandle) -> usize {
        let tokens = self.table.operations_for_client(client);
        let mut removed = 0usize;
        for token in tokens {
            match self.abort_operation(token) {
                Ok(()) => removed += 1,
                Err(err) if err.is_not_found() => {},
                Err(err) => {
                    tracing::warn!(%token, %client, error = %err, "cleanup after client death");
                },
            }
        }
        if removed > 0 {
            tracing::info!(%client, removed, "tore down operations for dead client");
        }
        removed
    }
}

impl std::fmt::Debug for OperationBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationBroker")
            .field("devices", &self.devices.len())
            .field("table", &self.table)
            .finish()
    }
}
