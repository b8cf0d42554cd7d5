//! In-memory chunk index for a file (`FileSnapshot`) and for a whole
//! directory tree (`DirSnapshot`), plus the directory version fingerprint.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

use sync_tools::digest;

use crate::chunker;

/// One contiguous, content-defined byte range of a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub offset: u64,
    pub size: u64,
    /// Lowercase hex-encoded SHA-256 of the chunk bytes.
    pub digest: String,
    pub ordinal: u64,
}

/// A file's chunked view: its chunks, plus two index views over them - by
/// digest (for the Differ's add/remove predicates) and by offset (for the
/// modify predicate and for ordered iteration). Both are rebuilt together
/// whenever the chunk list changes; see [`FileSnapshot::new`] and
/// [`FileSnapshot::reindex`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub filename: String,
    pub file_size: u64,
    pub mtime: i64,
    pub chunks: Vec<ChunkInfo>,

    #[serde(skip)]
    by_digest: HashMap<String, usize>,
    #[serde(skip)]
    by_offset: BTreeMap<u64, usize>,
}

impl FileSnapshot {
    pub fn new(filename: String, file_size: u64, mtime: i64, chunks: Vec<ChunkInfo>) -> Self {
        let mut snap = FileSnapshot {
            filename,
            file_size,
            mtime,
            chunks,
            by_digest: HashMap::new(),
            by_offset: BTreeMap::new(),
        };
        snap.reindex();
        snap
    }

    /// Empty-file snapshot, as inserted by the receiver on `FILE_CREATE`.
    pub fn empty(filename: String, mtime: i64) -> Self {
        FileSnapshot::new(filename, 0, mtime, Vec::new())
    }

    /// Rebuild `by_digest`/`by_offset` from `chunks`. Must be called after
    /// deserializing from the persisted snapshot cache, since the indexes
    /// are not themselves serialized.
    pub fn reindex(&mut self) {
        self.by_digest.clear();
        self.by_offset.clear();
        for (i, c) in self.chunks.iter().enumerate() {
            self.by_digest.insert(c.digest.clone(), i);
            self.by_offset.insert(c.offset, i);
        }
    }

    pub fn chunk_by_digest(&self, digest: &str) -> Option<&ChunkInfo> {
        self.by_digest.get(digest).map(|&i| &self.chunks[i])
    }

    pub fn chunk_by_offset(&self, offset: u64) -> Option<&ChunkInfo> {
        self.by_offset.get(&offset).map(|&i| &self.chunks[i])
    }

    pub fn digest_present(&self, digest: &str) -> bool {
        self.by_digest.contains_key(digest)
    }

    /// Chunk the file at `path` on disk into a new snapshot.
    pub fn scan_file(root: &Path, relative: &str) -> Result<Self, Error> {
        let full = root.join(relative);
        let meta = std::fs::metadata(&full)
            .with_context(|| format!("failed to stat {:?}", full))?;
        let file_size = meta.len();
        let mtime = mtime_secs(&meta);

        let mut file = std::fs::File::open(&full)
            .with_context(|| format!("failed to open {:?}", full))?;
        let boundaries = chunker::scan_reader(file_size, &mut file)?;

        let chunks = boundaries
            .into_iter()
            .enumerate()
            .map(|(ordinal, b)| ChunkInfo {
                offset: b.offset,
                size: b.size,
                digest: digest::hex_digest(&b.digest),
                ordinal: ordinal as u64,
            })
            .collect();

        Ok(FileSnapshot::new(relative.to_string(), file_size, mtime, chunks))
    }
}

fn mtime_secs(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime()
}

/// A directory tree's synchronization state: every tracked file's snapshot,
/// the set of known subdirectories, and a version fingerprint over all of
/// it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DirSnapshot {
    pub files: BTreeMap<String, FileSnapshot>,
    pub dirs: Vec<String>,
}

impl DirSnapshot {
    pub fn new() -> Self {
        DirSnapshot::default()
    }

    /// Rebuild every file's indexes; call after deserializing.
    pub fn reindex(&mut self) {
        for snap in self.files.values_mut() {
            snap.reindex();
        }
    }

    /// Walk `root` and build a fresh snapshot of every regular file and
    /// subdirectory under it.
    pub fn scan(root: &Path) -> Result<Self, Error> {
        let mut files = BTreeMap::new();
        let mut dirs = Vec::new();

        for entry in walkdir::WalkDir::new(root).min_depth(1) {
            let entry = entry.context("failed to walk working directory")?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("walkdir yields children of root")
                .to_string_lossy()
                .into_owned();

            if entry.file_type().is_dir() {
                dirs.push(relative);
            } else if entry.file_type().is_file() {
                let snap = FileSnapshot::scan_file(root, &relative)?;
                files.insert(relative, snap);
            }
        }

        dirs.sort();
        Ok(DirSnapshot { files, dirs })
    }

    /// The directory version fingerprint: a hash over the canonical,
    /// lexicographically sorted rendering of every file's chunk list.
    pub fn fingerprint(&self) -> String {
        let mut canon = String::new();
        for (filename, snap) in self.files.iter() {
            canon.push_str(filename);
            canon.push('|');
            canon.push_str(&snap.file_size.to_string());
            for chunk in snap.chunks.iter() {
                canon.push('|');
                canon.push_str(&format!("{}:{}:{}", chunk.offset, chunk.size, chunk.digest));
            }
            canon.push_str("||");
        }
        digest::hex_digest(&digest::sha256_bytes(canon.as_bytes()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn chunk(offset: u64, size: u64, digest: &str) -> ChunkInfo {
        ChunkInfo {
            offset,
            size,
            digest: digest.to_string(),
            ordinal: 0,
        }
    }

    #[test]
    fn fingerprint_is_deterministic_and_order_independent_across_runs() {
        let mut a = DirSnapshot::new();
        a.files.insert(
            "b.txt".to_string(),
            FileSnapshot::new("b.txt".into(), 4, 0, vec![chunk(0, 4, "dd")]),
        );
        a.files.insert(
            "a.txt".to_string(),
            FileSnapshot::new("a.txt".into(), 4, 0, vec![chunk(0, 4, "aa")]),
        );

        let mut b = DirSnapshot::new();
        b.files.insert(
            "a.txt".to_string(),
            FileSnapshot::new("a.txt".into(), 4, 0, vec![chunk(0, 4, "aa")]),
        );
        b.files.insert(
            "b.txt".to_string(),
            FileSnapshot::new("b.txt".into(), 4, 0, vec![chunk(0, 4, "dd")]),
        );

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn empty_directory_fingerprints_to_hash_of_empty_string() {
        let empty = DirSnapshot::new();
        let expected = digest::hex_digest(&digest::sha256_bytes(b""));
        assert_eq!(empty.fingerprint(), expected);
    }

    #[test]
    fn differing_content_changes_fingerprint() {
        let mut a = DirSnapshot::new();
        a.files.insert(
            "a.txt".to_string(),
            FileSnapshot::new("a.txt".into(), 4, 0, vec![chunk(0, 4, "aa")]),
        );
        let mut b = a.clone();
        b.files
            .get_mut("a.txt")
            .unwrap()
            .chunks
            .get_mut(0)
            .unwrap()
            .digest = "bb".to_string();
        b.files.get_mut("a.txt").unwrap().reindex();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn reindex_rebuilds_lookup_tables() {
        let mut snap = FileSnapshot::new(
            "f".into(),
            8,
            0,
            vec![chunk(0, 4, "aa"), chunk(4, 4, "bb")],
        );
        snap.by_digest = HashMap::new();
        snap.by_offset = BTreeMap::new();
        snap.reindex();
        assert!(snap.chunk_by_digest("aa").is_some());
        assert!(snap.chunk_by_offset(4).is_some());
    }
}
