//! Error types for the chunk-store / diff engine.

use std::path::PathBuf;

/// Chunk-store inconsistencies are fatal for the affected file only: the
/// scratch directory is discarded and the file is refetched whole on the
/// next reconcile cycle (§7).
#[derive(thiserror::Error, Debug)]
pub enum ChunkStoreError {
    #[error("malformed chunk-op header in {path:?}: {reason}")]
    MalformedHeader { path: PathBuf, reason: String },

    #[error("chunk op at offset {offset} in {filename} lies past the original file's end")]
    OffsetPastEnd { filename: String, offset: u64 },

    #[error("overlapping or out-of-order chunk ops for {filename}")]
    OutOfOrder { filename: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
