//! Content-defined chunking, the snapshot/diff algebra, and the per-file
//! chunk store that together let two peers exchange only the bytes that
//! actually changed between two directory trees.

pub mod chunk_store;
pub mod chunker;
pub mod differ;
pub mod error;
pub mod snapshot;

pub use chunk_store::ChunkStoreSession;
pub use differ::{compare_snapshots, get_file_modification, ChunkOp, ChunkOpKind, DirChanges, FileModification};
pub use error::ChunkStoreError;
pub use snapshot::{ChunkInfo, DirSnapshot, FileSnapshot};
