//! Peer-to-peer directory delta-synchronization engine.
//!
//! Ties together content-defined chunking and snapshot comparison
//! (`sync_datastore`), the framed wire protocol (`sync_protocol`), and the
//! local orchestration that drives one connection: initial convergence
//! (`reconciler`), live filesystem watching (`event_adapter`), and the
//! persisted peer-snapshot cache (`snapshot_store`).

pub mod event_adapter;
pub mod reconciler;
pub mod session;
pub mod signal;
pub mod snapshot_store;

pub use event_adapter::{EventAdapter, SyncAction};
pub use reconciler::{reconcile, Role};
pub use session::Peer;
pub use signal::{install as install_signal_handler, CancelToken};
pub use snapshot_store::SnapshotStore;
