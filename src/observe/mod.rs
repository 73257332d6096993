//! Observation subsystem.
//!
//! An observation reads a query once, remembers every record id the read
//! visited, and re-reads whenever a write batch touches one of those ids.
//! Listeners are notified at most once per batch and only when the
//! recomputed value differs from the previous one.

mod emitter;
mod observable;
mod stream;

pub use emitter::{ChangeEmitter, SubscriptionId};
pub use observable::{ListenerId, Observable};
pub use stream::ObservationStream;
