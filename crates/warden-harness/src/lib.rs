//! Test harness for the Warden operation table.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of the table's
//! specification: a handful of plain vectors, written to be obviously
//! correct. Operation sequences are applied to both the model and the real
//! table, and their observable states are compared after every step.
//!
//! The `fakes` module provides the collaborators the table and broker are
//! tested against: a recording liveness notifier and a slot-limited fake
//! engine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fakes;
pub mod model;

pub use fakes::{RecordingNotifier, SlotEngine};
pub use model::{ModelClientId, ModelEntry, ModelTable, TableOp};
