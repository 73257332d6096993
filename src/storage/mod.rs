//! Normalized record storage.
//!
//! `RecordStore` is the plain in-memory arena. `StoreData` wraps it behind a
//! lock together with the change emitter so writes can be batched and
//! broadcast to observations.

mod data;
mod records;

pub use data::{StoreData, WriteBatch};
pub use records::{RecordState, RecordStore, StoreSnapshot};
