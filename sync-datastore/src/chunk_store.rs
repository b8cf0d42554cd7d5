//! Per-file chunk-store session (§4.3): accumulates an unordered stream of
//! `ChunkOp`s on disk, then deterministically finalizes a new file from the
//! original plus those operations.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sync_tools::fs as fs_util;

use crate::differ::{ChunkOp, ChunkOpKind};
use crate::error::ChunkStoreError;

const HEADER_LEN: usize = 1 + 8 + 8 + 8 + 1;

fn kind_byte(kind: ChunkOpKind) -> u8 {
    match kind {
        ChunkOpKind::Add => 0x01,
        ChunkOpKind::Remove => 0x02,
        ChunkOpKind::Modify => 0x03,
    }
}

fn kind_from_byte(b: u8) -> Option<ChunkOpKind> {
    match b {
        0x01 => Some(ChunkOpKind::Add),
        0x02 => Some(ChunkOpKind::Remove),
        0x03 => Some(ChunkOpKind::Modify),
        _ => None,
    }
}

fn encode_header(op: &ChunkOp) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0] = kind_byte(op.kind);
    buf[1..9].copy_from_slice(&op.offset.to_le_bytes());
    buf[9..17].copy_from_slice(&op.new_size.to_le_bytes());
    buf[17..25].copy_from_slice(&op.old_size.to_le_bytes());
    buf[25] = if op.is_last { 1 } else { 0 };
    buf
}

fn decode_header(path: &Path, buf: &[u8]) -> Result<ChunkOp, ChunkStoreError> {
    if buf.len() != HEADER_LEN {
        return Err(ChunkStoreError::MalformedHeader {
            path: path.to_owned(),
            reason: format!("expected {} header bytes, got {}", HEADER_LEN, buf.len()),
        });
    }
    let kind = kind_from_byte(buf[0]).ok_or_else(|| ChunkStoreError::MalformedHeader {
        path: path.to_owned(),
        reason: format!("unknown op kind byte {:#x}", buf[0]),
    })?;
    let offset = u64::from_le_bytes(buf[1..9].try_into().unwrap());
    let new_size = u64::from_le_bytes(buf[9..17].try_into().unwrap());
    let old_size = u64::from_le_bytes(buf[17..25].try_into().unwrap());
    let is_last = buf[25] != 0;
    Ok(ChunkOp {
        kind,
        offset,
        new_size,
        old_size,
        is_last,
    })
}

/// Owns one file's scratch directory. Operations accumulate via
/// [`ChunkStoreSession::write_op`]; [`ChunkStoreSession::commit`] finalizes
/// the target file and releases the scratch directory. Dropping the session
/// without committing also releases the scratch directory - matching the
/// scoped-acquisition pattern where every exit path (success, error, crash
/// recovery on next run) leaves no stray scratch state behind.
pub struct ChunkStoreSession {
    scratch_dir: PathBuf,
    target: PathBuf,
}

impl ChunkStoreSession {
    pub fn open(target: PathBuf) -> Result<Self, ChunkStoreError> {
        let scratch_dir = fs_util::scratch_dir_for(&target);
        fs_util::ensure_dir(&scratch_dir)?;
        Ok(ChunkStoreSession { scratch_dir, target })
    }

    /// Record one chunk operation; `payload` is the new chunk bytes (empty
    /// for REMOVE).
    pub fn write_op(&self, op: &ChunkOp, payload: &[u8]) -> Result<(), ChunkStoreError> {
        let path = self.scratch_dir.join(format!("chunk-{}.bin", op.offset));
        let mut file = File::create(&path)?;
        file.write_all(&encode_header(op))?;
        file.write_all(payload)?;
        Ok(())
    }

    fn read_ops(&self) -> Result<Vec<(ChunkOp, PathBuf)>, ChunkStoreError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.scratch_dir)? {
            let entry = entry?;
            let path = entry.path();
            let mut file = File::open(&path)?;
            let mut header = [0u8; HEADER_LEN];
            file.read_exact(&mut header)?;
            let op = decode_header(&path, &header)?;
            entries.push((op, path));
        }
        entries.sort_by_key(|(op, _)| op.offset);
        Ok(entries)
    }

    /// Run the 7-step finalize procedure and release the scratch directory.
    pub fn commit(self) -> Result<(), ChunkStoreError> {
        let ops = self.read_ops()?;

        let mut original = File::open(&self.target).ok();
        let original_size = original
            .as_ref()
            .map(|f| f.metadata().map(|m| m.len()))
            .transpose()?
            .unwrap_or(0);

        let incoming_path = fs_util::incoming_path_for(&self.target);
        let mut incoming = fs_util::open_append(&incoming_path)?;

        let mut cursor: u64 = 0;
        for (op, op_path) in ops.iter() {
            if op.offset < cursor {
                return Err(ChunkStoreError::OutOfOrder {
                    filename: self.target.to_string_lossy().into_owned(),
                });
            }
            if op.offset > cursor {
                let span = op.offset - cursor;
                match original.as_mut() {
                    Some(orig) => {
                        seek_original(orig, cursor)?;
                        fs_util::copy_exact(orig, &mut incoming, span).map_err(|_| {
                            ChunkStoreError::OffsetPastEnd {
                                filename: self.target.to_string_lossy().into_owned(),
                                offset: op.offset,
                            }
                        })?
                    }
                    None => {
                        return Err(ChunkStoreError::OffsetPastEnd {
                            filename: self.target.to_string_lossy().into_owned(),
                            offset: op.offset,
                        })
                    }
                }
                cursor = op.offset;
            }

            match op.kind {
                ChunkOpKind::Add => {
                    let mut op_file = File::open(op_path)?;
                    op_file.seek_to_payload()?;
                    fs_util::copy_exact(&mut op_file, &mut incoming, op.new_size)?;
                }
                ChunkOpKind::Remove => {
                    cursor += op.old_size;
                }
                ChunkOpKind::Modify => {
                    let mut op_file = File::open(op_path)?;
                    op_file.seek_to_payload()?;
                    fs_util::copy_exact(&mut op_file, &mut incoming, op.new_size)?;
                    cursor += op.old_size;
                }
            }
        }

        if original_size > cursor {
            if let Some(orig) = original.as_mut() {
                seek_original(orig, cursor)?;
                fs_util::copy_exact(orig, &mut incoming, original_size - cursor)?;
            }
        }

        drop(incoming);
        fs_util::atomic_replace(&incoming_path, &self.target)
            .map_err(|err| ChunkStoreError::MalformedHeader {
                path: self.target.clone(),
                reason: err.to_string(),
            })?;

        fs_util::remove_dir_all_lenient(&self.scratch_dir);
        Ok(())
    }
}

impl Drop for ChunkStoreSession {
    fn drop(&mut self) {
        fs_util::remove_dir_all_lenient(&self.scratch_dir);
    }
}

fn seek_original(file: &mut File, pos: u64) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::Start(pos))?;
    Ok(())
}

trait SeekToPayload {
    fn seek_to_payload(&mut self) -> std::io::Result<()>;
}

impl SeekToPayload for File {
    fn seek_to_payload(&mut self) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom};
        self.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read as _;

    fn op(kind: ChunkOpKind, offset: u64, new_size: u64, old_size: u64, is_last: bool) -> ChunkOp {
        ChunkOp {
            kind,
            offset,
            new_size,
            old_size,
            is_last,
        }
    }

    #[test]
    fn header_roundtrips() {
        let o = op(ChunkOpKind::Modify, 1234, 10, 8, true);
        let encoded = encode_header(&o);
        let decoded = decode_header(Path::new("x"), &encoded).unwrap();
        assert_eq!(decoded.offset, 1234);
        assert_eq!(decoded.new_size, 10);
        assert_eq!(decoded.old_size, 8);
        assert!(decoded.is_last);
        assert_eq!(decoded.kind, ChunkOpKind::Modify);
    }

    #[test]
    fn commit_applies_single_modify_in_middle() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.txt");
        std::fs::write(&target, b"ABC\n").unwrap();

        let session = ChunkStoreSession::open(target.clone()).unwrap();
        session
            .write_op(&op(ChunkOpKind::Modify, 0, 4, 4, true), b"AB\x58\n")
            .unwrap();
        session.commit().unwrap();

        let mut out = String::new();
        File::open(&target).unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "AB\u{58}\n");
    }

    #[test]
    fn commit_handles_append_only_tail() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.txt");
        std::fs::write(&target, vec![b'A'; 100]).unwrap();

        let session = ChunkStoreSession::open(target.clone()).unwrap();
        session
            .write_op(&op(ChunkOpKind::Modify, 0, 101, 100, true), &vec![b'A'; 101])
            .unwrap();
        session.commit().unwrap();

        let out = std::fs::read(&target).unwrap();
        assert_eq!(out.len(), 101);
        assert!(out.iter().all(|&b| b == b'A'));
    }

    #[test]
    fn commit_creates_new_file_via_add_only() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("b.txt");

        let session = ChunkStoreSession::open(target.clone()).unwrap();
        session
            .write_op(&op(ChunkOpKind::Add, 0, 2, 0, true), b"hi")
            .unwrap();
        session.commit().unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"hi");
    }

    #[test]
    fn drop_without_commit_cleans_up_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("c.txt");
        let scratch = sync_tools::fs::scratch_dir_for(&target);
        {
            let session = ChunkStoreSession::open(target.clone()).unwrap();
            session
                .write_op(&op(ChunkOpKind::Add, 0, 2, 0, true), b"hi")
                .unwrap();
            assert!(scratch.exists());
        }
        assert!(!scratch.exists());
    }

    #[test]
    fn remove_and_add_around_middle_removal() {
        // original = "12345", remove bytes [1,3) ("23"), keep rest -> "145"
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("d.txt");
        std::fs::write(&target, b"12345").unwrap();

        let session = ChunkStoreSession::open(target.clone()).unwrap();
        session
            .write_op(&op(ChunkOpKind::Remove, 1, 0, 2, true), b"")
            .unwrap();
        session.commit().unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"145");
    }
}
