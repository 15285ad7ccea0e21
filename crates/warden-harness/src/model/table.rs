//! Reference table model.

use warden_core::{ClientHandle, OperationToken};

/// One tracked operation in the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /// Token minted by the real table.
    pub token: OperationToken,
    /// Owning client.
    pub client: ClientHandle,
    /// The key bytes the real table is expected to return on lookup.
    pub key: Vec<u8>,
    /// Whether the operation participates in LRU ordering.
    pub pruneable: bool,
}

/// Obviously-correct reference implementation of the table's specification.
///
/// Two vectors: entries in registration order, pruneable tokens in recency
/// order. Everything else is derived by scanning.
#[derive(Debug, Default)]
pub struct ModelTable {
    entries: Vec<ModelEntry>,
    lru: Vec<OperationToken>,
}

impl ModelTable {
    /// Create an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a token the real table just minted.
    pub fn track(&mut self, token: OperationToken, client: ClientHandle, key: Vec<u8>, pruneable: bool) {
        self.entries.push(ModelEntry { token, client, key, pruneable });
        if pruneable {
            self.lru.push(token);
        }
    }

    /// Look up an entry, refreshing its recency if pruneable.
    pub fn lookup(&mut self, token: OperationToken) -> Option<ModelEntry> {
        let entry = self.entries.iter().find(|e| e.token == token)?.clone();
        if let Some(pos) = self.lru.iter().position(|t| *t == token) {
            self.lru.remove(pos);
            self.lru.push(token);
        }
        Some(entry)
    }

    /// Remove an entry. Returns true if it was live.
    pub fn remove(&mut self, token: OperationToken) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.token == token) else {
            return false;
        };
        self.entries.remove(pos);
        self.lru.retain(|t| *t != token);
        true
    }

    /// Remove everything a dead client owns. Returns the count removed.
    pub fn client_death(&mut self, client: ClientHandle) -> usize {
        let doomed: Vec<_> =
            self.entries.iter().filter(|e| e.client == client).map(|e| e.token).collect();
        for token in &doomed {
            self.remove(*token);
        }
        doomed.len()
    }

    /// The least-recently-used pruneable token, if any.
    #[must_use]
    pub fn oldest_pruneable(&self) -> Option<OperationToken> {
        self.lru.first().copied()
    }

    /// True iff at least one pruneable entry is live.
    #[must_use]
    pub fn has_pruneable(&self) -> bool {
        !self.lru.is_empty()
    }

    /// The client's live tokens in registration order.
    #[must_use]
    pub fn operations_for_client(&self, client: ClientHandle) -> Vec<OperationToken> {
        self.entries.iter().filter(|e| e.client == client).map(|e| e.token).collect()
    }

    /// Every live token in registration order.
    #[must_use]
    pub fn live_tokens(&self) -> Vec<OperationToken> {
        self.entries.iter().map(|e| e.token).collect()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
