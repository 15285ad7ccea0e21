//! Warden operation-tracking core.
//!
//! In-memory bookkeeping for a key-management daemon that brokers access to
//! hardware-backed cryptographic engines with a bounded number of operation
//! slots. Every in-flight engine operation is tracked behind an opaque,
//! daemon-minted token; pruneable operations carry a least-recently-used
//! ordering so slot pressure can reclaim the coldest one; and every
//! operation is indexed by its owning client so a dead connection tears down
//! everything it left behind.
//!
//! ## Architecture
//!
//! ```text
//! warden-core
//!   ├─ OperationTable   (token map + LRU order + per-client index)
//!   ├─ KeyMaterial      (owned, zeroize-on-drop key copies)
//!   ├─ DeathNotifier    (injected liveness capability)
//!   └─ handles          (opaque token / client / engine / device ids)
//! ```
//!
//! The table is pure bookkeeping: it never talks to an engine and never
//! performs I/O. The daemon-side collaborators (engine boundary, eviction
//! policy, death-watch bridge) live in `warden-daemon`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handle;
pub mod key_material;
pub mod liveness;
pub mod table;

pub use error::OperationError;
pub use handle::{ClientHandle, DeviceId, EngineHandle, OperationToken};
pub use key_material::KeyMaterial;
pub use liveness::DeathNotifier;
pub use table::{OperationSnapshot, OperationTable};
