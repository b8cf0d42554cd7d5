//! The wire message taxonomy (§4.5): a tagged union over every
//! request/response/one-shot message the protocol exchanges. The on-wire
//! tag is the variant discriminator; an unknown tag fails closed at
//! deserialization rather than being silently ignored.

use serde::{Deserialize, Serialize};

use sync_datastore::{ChunkOpKind, FileSnapshot};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum Message {
    // --- snapshot introspection ---
    #[serde(rename = "REQ_SNAP_VERSION")]
    ReqSnapVersion,
    #[serde(rename = "SNAP_VERSION")]
    SnapVersion { fingerprint: String },
    #[serde(rename = "REQ_SNAP")]
    ReqSnap,
    #[serde(rename = "DATA_SNAP")]
    DataSnap { files: Vec<FileSnapshot> },
    #[serde(rename = "REQ_DIR_LIST")]
    ReqDirList,
    #[serde(rename = "DIR_LIST")]
    DirList { dirs: Vec<String> },

    // --- directory mutations ---
    #[serde(rename = "DIR_CREATE")]
    DirCreate { path: String },
    #[serde(rename = "DIR_REMOVE")]
    DirRemove { path: String },
    #[serde(rename = "DIR_MOVED")]
    DirMoved { old: String, new: String },
    #[serde(rename = "DIRS_CREATE")]
    DirsCreate { paths: Vec<String> },
    #[serde(rename = "DIRS_REMOVE")]
    DirsRemove { paths: Vec<String> },

    // --- file mutations ---
    #[serde(rename = "FILE_CREATE")]
    FileCreate { filename: String },
    #[serde(rename = "FILE_REMOVE")]
    FileRemove { filename: String },
    #[serde(rename = "FILES_REMOVE")]
    FilesRemove { filenames: Vec<String> },
    #[serde(rename = "FILE_MOVED")]
    FileMoved { old: String, new: String },
    #[serde(rename = "FILES_CREATE")]
    FilesCreate { filenames: Vec<String> },

    // --- chunk-level transfer ---
    #[serde(rename = "MODIFIED_CHUNK")]
    ModifiedChunk {
        kind: ChunkOpKind,
        filename: String,
        offset: u64,
        new_size: u64,
        old_size: u64,
        is_last: bool,
    },
    #[serde(rename = "SEND_FILE")]
    SendFile {
        filename: String,
        file_size: u64,
        n_chunks: u64,
    },
    #[serde(rename = "SEND_CHUNK")]
    SendChunk {
        filename: String,
        chunk_size: u64,
        ordinal: u64,
        is_last: bool,
    },
    #[serde(rename = "REQ_CHUNK")]
    ReqChunk {
        filename: String,
        offset: u64,
        chunk_size: u64,
    },
    #[serde(rename = "REQ_DOWNLOAD_FILES")]
    ReqDownloadFiles { filenames: Vec<String> },
}

impl Message {
    /// The size, if any, of the raw byte blob that immediately follows this
    /// message on the wire (§4.4). Only `MODIFIED_CHUNK` (for ADD/MODIFY)
    /// and `SEND_CHUNK` carry one.
    pub fn trailing_payload_len(&self) -> Option<u64> {
        match self {
            Message::ModifiedChunk {
                kind, new_size, ..
            } if *kind != ChunkOpKind::Remove => Some(*new_size),
            Message::SendChunk { chunk_size, .. } => Some(*chunk_size),
            _ => None,
        }
    }
}
