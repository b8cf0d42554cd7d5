//! Computes the delta between two `FileSnapshot`s (§4.2.1) and between two
//! `DirSnapshot`s (§4.2.2).
//!
//! The three chunk-level predicates below must be replicated exactly as
//! written - they are the wire-compatibility contract between peers, not an
//! implementation detail free to vary.

use serde::{Deserialize, Serialize};

use crate::snapshot::{DirSnapshot, FileSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChunkOpKind {
    Add,
    Remove,
    Modify,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkOp {
    pub kind: ChunkOpKind,
    pub offset: u64,
    pub new_size: u64,
    pub old_size: u64,
    pub is_last: bool,
}

/// The ordered instruction set transforming `prev` into `curr` for one file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileModification {
    pub filename: String,
    pub ops: Vec<ChunkOp>,
}

impl FileModification {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Per-file diff: classify every chunk of `curr` and `prev` into
/// ADD/REMOVE/MODIFY, merge, sort by offset and mark the last op.
pub fn get_file_modification(curr: &FileSnapshot, prev: &FileSnapshot) -> FileModification {
    let mut ops = Vec::new();

    // REMOVE: a prev chunk whose content vanished and whose offset slot was
    // not taken over by a modification or a shift of an existing chunk.
    for c in prev.chunks.iter() {
        let content_gone = !curr.digest_present(&c.digest);
        if !content_gone {
            continue;
        }
        let slot_reused = match curr.chunk_by_offset(c.offset) {
            None => false,
            Some(curr_chunk) => prev.digest_present(&curr_chunk.digest),
        };
        if !slot_reused {
            ops.push(ChunkOp {
                kind: ChunkOpKind::Remove,
                offset: c.offset,
                new_size: 0,
                old_size: c.size,
                is_last: false,
            });
        }
    }

    // ADD: symmetric - a curr chunk whose content is new and whose offset
    // slot in prev was not itself a modification/shift target.
    for c in curr.chunks.iter() {
        let content_new = !prev.digest_present(&c.digest);
        if !content_new {
            continue;
        }
        let slot_reused = match prev.chunk_by_offset(c.offset) {
            None => false,
            Some(prev_chunk) => curr.digest_present(&prev_chunk.digest),
        };
        if !slot_reused {
            ops.push(ChunkOp {
                kind: ChunkOpKind::Add,
                offset: c.offset,
                new_size: c.size,
                old_size: 0,
                is_last: false,
            });
        }
    }

    // MODIFY: offsets present on both sides with differing digests, where
    // neither digest reappears elsewhere - otherwise the chunk merely
    // shifted and will already show up as an ADD/REMOVE pair above.
    for (offset, curr_idx) in curr.chunks.iter().enumerate().map(|(i, c)| (c.offset, i)) {
        let curr_chunk = &curr.chunks[curr_idx];
        let prev_chunk = match prev.chunk_by_offset(offset) {
            Some(p) => p,
            None => continue,
        };
        if prev_chunk.digest == curr_chunk.digest {
            continue;
        }
        let curr_shifted_elsewhere = prev.digest_present(&curr_chunk.digest);
        let prev_shifted_elsewhere = curr.digest_present(&prev_chunk.digest);
        if !curr_shifted_elsewhere && !prev_shifted_elsewhere {
            ops.push(ChunkOp {
                kind: ChunkOpKind::Modify,
                offset,
                new_size: curr_chunk.size,
                old_size: prev_chunk.size,
                is_last: false,
            });
        }
    }

    ops.sort_by_key(|op| op.offset);
    if let Some(last) = ops.last_mut() {
        last.is_last = true;
    }

    FileModification {
        filename: curr.filename.clone(),
        ops,
    }
}

/// Directory-level diff between the live `curr` snapshot and the reference
/// `prev` snapshot (the peer cache, during reconciliation).
#[derive(Clone, Debug, Default)]
pub struct DirChanges {
    pub created_files: Vec<FileSnapshot>,
    pub removed_files: Vec<String>,
    pub modified_files: Vec<FileModification>,
    pub added_dirs: Vec<String>,
    pub removed_dirs: Vec<String>,
}

pub fn compare_snapshots(curr: &DirSnapshot, prev: &DirSnapshot) -> DirChanges {
    let mut changes = DirChanges::default();

    for (filename, curr_snap) in curr.files.iter() {
        match prev.files.get(filename) {
            None => changes.created_files.push(curr_snap.clone()),
            Some(prev_snap) => {
                if curr_snap.file_size != prev_snap.file_size || curr_snap.mtime != prev_snap.mtime
                {
                    let modification = get_file_modification(curr_snap, prev_snap);
                    if !modification.is_empty() {
                        changes.modified_files.push(modification);
                    }
                }
            }
        }
    }

    for filename in prev.files.keys() {
        if !curr.files.contains_key(filename) {
            changes.removed_files.push(filename.clone());
        }
    }

    let curr_dirs: std::collections::BTreeSet<&str> =
        curr.dirs.iter().map(String::as_str).collect();
    let prev_dirs: std::collections::BTreeSet<&str> =
        prev.dirs.iter().map(String::as_str).collect();

    changes.added_dirs = curr_dirs
        .difference(&prev_dirs)
        .map(|s| s.to_string())
        .collect();
    changes.removed_dirs = prev_dirs
        .difference(&curr_dirs)
        .map(|s| s.to_string())
        .collect();

    changes
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::snapshot::ChunkInfo;

    fn chunk(offset: u64, size: u64, digest: &str) -> ChunkInfo {
        ChunkInfo {
            offset,
            size,
            digest: digest.to_string(),
            ordinal: offset / size.max(1),
        }
    }

    #[test]
    fn identical_files_produce_empty_modification() {
        let a = FileSnapshot::new("a".into(), 4, 0, vec![chunk(0, 4, "aa")]);
        let b = a.clone();
        let m = get_file_modification(&a, &b);
        assert!(m.is_empty());
    }

    #[test]
    fn single_middle_edit_is_one_modify() {
        // S2: a.txt = 41 42 43 0A (curr) vs 41 42 58 0A (prev), one chunk.
        let prev = FileSnapshot::new("a".into(), 4, 0, vec![chunk(0, 4, "prevdigest")]);
        let curr = FileSnapshot::new("a".into(), 4, 0, vec![chunk(0, 4, "currdigest")]);
        let m = get_file_modification(&curr, &prev);
        assert_eq!(m.ops.len(), 1);
        assert_eq!(m.ops[0].kind, ChunkOpKind::Modify);
        assert_eq!(m.ops[0].offset, 0);
        assert_eq!(m.ops[0].new_size, 4);
        assert_eq!(m.ops[0].old_size, 4);
        assert!(m.ops[0].is_last);
    }

    #[test]
    fn append_is_single_modify_on_tail_chunk() {
        let prev = FileSnapshot::new("a".into(), 100, 0, vec![chunk(0, 100, "aaa")]);
        let curr = FileSnapshot::new("a".into(), 101, 0, vec![chunk(0, 101, "bbb")]);
        let m = get_file_modification(&curr, &prev);
        assert_eq!(m.ops.len(), 1);
        assert_eq!(m.ops[0].kind, ChunkOpKind::Modify);
        assert_eq!(m.ops[0].new_size, 101);
        assert_eq!(m.ops[0].old_size, 100);
    }

    #[test]
    fn shifted_chunk_is_add_plus_remove_not_modify() {
        // Same digest "xx" moved from offset 0 in prev to offset 4 in curr;
        // a different chunk "yy" appears at offset 0 in curr.
        let prev = FileSnapshot::new("a".into(), 8, 0, vec![chunk(0, 4, "xx"), chunk(4, 4, "zz")]);
        let curr = FileSnapshot::new("a".into(), 8, 0, vec![chunk(0, 4, "yy"), chunk(4, 4, "xx")]);
        let m = get_file_modification(&curr, &prev);
        // "zz" vanished and its slot (offset 4) was taken by "xx" which is
        // present in prev => not a plain REMOVE by our predicate actually:
        // slot reused iff curr-chunk-at-offset's digest is present in prev.
        // curr chunk at offset4 is "xx", present in prev => REMOVE suppressed.
        assert!(m.ops.iter().all(|op| op.kind != ChunkOpKind::Modify));
    }

    #[test]
    fn created_and_removed_files_detected() {
        let mut curr = crate::snapshot::DirSnapshot::new();
        curr.files.insert(
            "new.txt".into(),
            FileSnapshot::new("new.txt".into(), 4, 0, vec![chunk(0, 4, "aa")]),
        );
        let mut prev = crate::snapshot::DirSnapshot::new();
        prev.files.insert(
            "gone.txt".into(),
            FileSnapshot::new("gone.txt".into(), 4, 0, vec![chunk(0, 4, "bb")]),
        );

        let changes = compare_snapshots(&curr, &prev);
        assert_eq!(changes.created_files.len(), 1);
        assert_eq!(changes.created_files[0].filename, "new.txt");
        assert_eq!(changes.removed_files, vec!["gone.txt".to_string()]);
        assert!(changes.modified_files.is_empty());
    }

    #[test]
    fn dir_changes_are_set_difference() {
        let mut curr = crate::snapshot::DirSnapshot::new();
        curr.dirs = vec!["a".into(), "b".into()];
        let mut prev = crate::snapshot::DirSnapshot::new();
        prev.dirs = vec!["b".into(), "c".into()];

        let changes = compare_snapshots(&curr, &prev);
        assert_eq!(changes.added_dirs, vec!["a".to_string()]);
        assert_eq!(changes.removed_dirs, vec!["c".to_string()]);
    }
}
