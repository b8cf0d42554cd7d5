//! Drives one peer connection: the request/response helpers a sender uses
//! to push or pull changes, and the application of inbound mutations to the
//! local working directory and snapshot. Both roles are symmetric, so the
//! same `Peer` type serves either side of the connection.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Error};

use sync_datastore::{
    get_file_modification, ChunkOp, ChunkOpKind, ChunkStoreSession, DirSnapshot, FileSnapshot,
};
use sync_protocol::{Message, Messenger};

pub struct Peer<S> {
    pub working_root: PathBuf,
    messenger: Messenger<S>,
}

impl<S> Peer<S>
where
    S: Read + Write,
{
    pub fn new(working_root: PathBuf, socket: S) -> Self {
        Peer {
            working_root,
            messenger: Messenger::new(socket),
        }
    }

    fn target(&self, relative: &str) -> PathBuf {
        self.working_root.join(relative)
    }

    // ---------------------------------------------------------------
    // snapshot introspection
    // ---------------------------------------------------------------

    pub fn request_snap_version(&mut self) -> Result<String, Error> {
        self.messenger.send_message(&Message::ReqSnapVersion)?;
        match self.messenger.receive_message()? {
            Message::SnapVersion { fingerprint } => Ok(fingerprint),
            other => Err(unexpected("SNAP_VERSION", &other)),
        }
    }

    pub fn serve_snap_version(&mut self, local: &DirSnapshot) -> Result<(), Error> {
        self.messenger.send_message(&Message::SnapVersion {
            fingerprint: local.fingerprint(),
        })?;
        Ok(())
    }

    pub fn request_snap(&mut self) -> Result<Vec<FileSnapshot>, Error> {
        self.messenger.send_message(&Message::ReqSnap)?;
        match self.messenger.receive_message()? {
            Message::DataSnap { files } => Ok(files),
            other => Err(unexpected("DATA_SNAP", &other)),
        }
    }

    pub fn serve_snap(&mut self, local: &DirSnapshot) -> Result<(), Error> {
        let files = local.files.values().cloned().collect();
        self.messenger.send_message(&Message::DataSnap { files })?;
        Ok(())
    }

    pub fn request_dir_list(&mut self) -> Result<Vec<String>, Error> {
        self.messenger.send_message(&Message::ReqDirList)?;
        match self.messenger.receive_message()? {
            Message::DirList { dirs } => Ok(dirs),
            other => Err(unexpected("DIR_LIST", &other)),
        }
    }

    pub fn serve_dir_list(&mut self, local: &DirSnapshot) -> Result<(), Error> {
        self.messenger.send_message(&Message::DirList {
            dirs: local.dirs.clone(),
        })?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // directory mutation senders (one-shot, no response)
    // ---------------------------------------------------------------

    pub fn send_dir_create(&mut self, path: &str) -> Result<(), Error> {
        Ok(self
            .messenger
            .send_message(&Message::DirCreate { path: path.to_string() })?)
    }

    pub fn send_dir_remove(&mut self, path: &str) -> Result<(), Error> {
        Ok(self
            .messenger
            .send_message(&Message::DirRemove { path: path.to_string() })?)
    }

    pub fn send_dir_moved(&mut self, old: &str, new: &str) -> Result<(), Error> {
        Ok(self.messenger.send_message(&Message::DirMoved {
            old: old.to_string(),
            new: new.to_string(),
        })?)
    }

    pub fn send_dirs_create(&mut self, paths: &[String]) -> Result<(), Error> {
        Ok(self
            .messenger
            .send_message(&Message::DirsCreate { paths: paths.to_vec() })?)
    }

    pub fn send_dirs_remove(&mut self, paths: &[String]) -> Result<(), Error> {
        Ok(self
            .messenger
            .send_message(&Message::DirsRemove { paths: paths.to_vec() })?)
    }

    // ---------------------------------------------------------------
    // file mutation senders
    // ---------------------------------------------------------------

    pub fn send_file_create(&mut self, filename: &str) -> Result<(), Error> {
        Ok(self.messenger.send_message(&Message::FileCreate {
            filename: filename.to_string(),
        })?)
    }

    pub fn send_file_remove(&mut self, filename: &str) -> Result<(), Error> {
        Ok(self.messenger.send_message(&Message::FileRemove {
            filename: filename.to_string(),
        })?)
    }

    pub fn send_files_remove(&mut self, filenames: &[String]) -> Result<(), Error> {
        Ok(self.messenger.send_message(&Message::FilesRemove {
            filenames: filenames.to_vec(),
        })?)
    }

    pub fn send_file_moved(&mut self, old: &str, new: &str) -> Result<(), Error> {
        Ok(self.messenger.send_message(&Message::FileMoved {
            old: old.to_string(),
            new: new.to_string(),
        })?)
    }

    // ---------------------------------------------------------------
    // full-file push/pull (FILES_CREATE / SEND_FILE / SEND_CHUNK)
    // ---------------------------------------------------------------

    /// Push whole files: `FILES_CREATE{filenames}` followed by one
    /// `SEND_FILE`/`SEND_CHUNK*` stream per file, in order. Used by the
    /// reconciler's batch push.
    pub fn push_files_create(&mut self, snapshots: &[FileSnapshot]) -> Result<(), Error> {
        let filenames: Vec<String> = snapshots.iter().map(|s| s.filename.clone()).collect();
        self.messenger
            .send_message(&Message::FilesCreate { filenames })?;
        for snap in snapshots {
            self.push_full_file(snap)?;
        }
        Ok(())
    }

    /// Push a single newly created file: `FILE_CREATE{filename}` followed by
    /// its `SEND_FILE`/`SEND_CHUNK*` stream. Used by the live single-file
    /// create path, where `FILES_CREATE` would be the wrong tag.
    pub fn push_file_create(&mut self, snap: &FileSnapshot) -> Result<(), Error> {
        self.send_file_create(&snap.filename)?;
        self.push_full_file(snap)
    }

    fn push_full_file(&mut self, snap: &FileSnapshot) -> Result<(), Error> {
        self.messenger.send_message(&Message::SendFile {
            filename: snap.filename.clone(),
            file_size: snap.file_size,
            n_chunks: snap.chunks.len() as u64,
        })?;

        let path = self.target(&snap.filename);
        let mut file = File::open(&path).with_context(|| format!("failed to open {:?}", path))?;

        let n = snap.chunks.len();
        for (i, chunk) in snap.chunks.iter().enumerate() {
            let mut buf = vec![0u8; chunk.size as usize];
            file.seek(SeekFrom::Start(chunk.offset))?;
            file.read_exact(&mut buf)?;
            self.messenger.send_message(&Message::SendChunk {
                filename: snap.filename.clone(),
                chunk_size: chunk.size,
                ordinal: i as u64,
                is_last: i + 1 == n,
            })?;
            self.messenger.send_bytes(&buf)?;
        }
        if n == 0 {
            // empty file: nothing to append, but the file must still exist
            // on the receiving side once FILE_CREATE/FILES_CREATE lands.
        }
        Ok(())
    }

    /// Request whole files by name; receive and write each in turn,
    /// returning their freshly-scanned snapshots.
    pub fn request_download_files(&mut self, filenames: &[String]) -> Result<Vec<FileSnapshot>, Error> {
        self.messenger.send_message(&Message::ReqDownloadFiles {
            filenames: filenames.to_vec(),
        })?;

        let mut result = Vec::with_capacity(filenames.len());
        for filename in filenames {
            match self.messenger.receive_message()? {
                Message::SendFile {
                    filename: wire_name,
                    file_size,
                    n_chunks,
                } => {
                    if &wire_name != filename {
                        bail!(
                            "REQ_DOWNLOAD_FILES: expected {} next, got {}",
                            filename,
                            wire_name
                        );
                    }
                    let snap = self.receive_full_file(&wire_name, file_size, n_chunks)?;
                    result.push(snap);
                }
                other => return Err(unexpected("SEND_FILE", &other)),
            }
        }
        Ok(result)
    }

    /// Serve a `REQ_DOWNLOAD_FILES` request from the peer's side.
    pub fn serve_download_files(&mut self, filenames: &[String], local: &DirSnapshot) -> Result<(), Error> {
        for filename in filenames {
            let snap = local
                .files
                .get(filename)
                .ok_or_else(|| anyhow!("REQ_DOWNLOAD_FILES: unknown file {}", filename))?;
            self.push_full_file(snap)?;
        }
        Ok(())
    }

    fn receive_full_file(&mut self, filename: &str, file_size: u64, n_chunks: u64) -> Result<FileSnapshot, Error> {
        let path = self.target(filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&path)
            .with_context(|| format!("failed to create {:?}", path))?;

        for ordinal in 0..n_chunks {
            match self.messenger.receive_message()? {
                Message::SendChunk {
                    filename: wire_name,
                    chunk_size,
                    ordinal: wire_ordinal,
                    is_last,
                } => {
                    if wire_name != filename || wire_ordinal != ordinal {
                        return Err(state_violation(format!(
                            "SEND_CHUNK out of order for {}",
                            filename
                        )));
                    }
                    if is_last != (ordinal + 1 == n_chunks) {
                        return Err(state_violation(format!(
                            "SEND_CHUNK is_last mismatch for {}",
                            filename
                        )));
                    }
                    let bytes = self.messenger.receive_bytes(chunk_size)?;
                    file.write_all(&bytes)?;
                }
                other => return Err(unexpected("SEND_CHUNK", &other)),
            }
        }
        drop(file);

        let meta = fs::metadata(&path)?;
        if meta.len() != file_size {
            bail!(
                "received file {} has size {}, expected {}",
                filename,
                meta.len(),
                file_size
            );
        }
        FileSnapshot::scan_file(&self.working_root, filename)
    }

    // ---------------------------------------------------------------
    // chunk-level transfer (MODIFIED_CHUNK / REQ_CHUNK)
    // ---------------------------------------------------------------

    /// Push a file modification: the local side is authoritative (newer
    /// mtime), so it streams `MODIFIED_CHUNK` ops in ascending-offset order
    /// with the new bytes for ADD/MODIFY.
    pub fn push_modification(
        &mut self,
        filename: &str,
        modification: &sync_datastore::FileModification,
    ) -> Result<(), Error> {
        let path = self.target(filename);
        let mut file = if modification
            .ops
            .iter()
            .any(|op| op.kind != ChunkOpKind::Remove)
        {
            Some(File::open(&path).with_context(|| format!("failed to open {:?}", path))?)
        } else {
            None
        };

        for op in modification.ops.iter() {
            self.messenger.send_message(&Message::ModifiedChunk {
                kind: op.kind,
                filename: filename.to_string(),
                offset: op.offset,
                new_size: op.new_size,
                old_size: op.old_size,
                is_last: op.is_last,
            })?;
            if op.kind != ChunkOpKind::Remove {
                let f = file.as_mut().expect("opened above for non-REMOVE ops");
                let mut buf = vec![0u8; op.new_size as usize];
                f.seek(SeekFrom::Start(op.offset))?;
                f.read_exact(&mut buf)?;
                self.messenger.send_bytes(&buf)?;
            }
        }
        Ok(())
    }

    /// Receive and apply one `MODIFIED_CHUNK` stream, starting from the
    /// already-received first header.
    pub fn receive_modified_chunk_stream(
        &mut self,
        filename: String,
        first: (ChunkOpKind, u64, u64, u64, bool),
    ) -> Result<(), Error> {
        let path = self.target(&filename);
        let session = ChunkStoreSession::open(path)?;

        let mut header = first;
        loop {
            let (kind, offset, new_size, old_size, is_last) = header;
            let op = ChunkOp {
                kind,
                offset,
                new_size,
                old_size,
                is_last,
            };
            if kind != ChunkOpKind::Remove {
                let bytes = self.messenger.receive_bytes(new_size)?;
                session.write_op(&op, &bytes)?;
            } else {
                session.write_op(&op, &[])?;
            }
            if is_last {
                break;
            }
            match self.messenger.receive_message()? {
                Message::ModifiedChunk {
                    kind,
                    filename: wire_name,
                    offset,
                    new_size,
                    old_size,
                    is_last,
                } if wire_name == filename => {
                    header = (kind, offset, new_size, old_size, is_last);
                }
                other => return Err(unexpected("MODIFIED_CHUNK", &other)),
            }
        }

        session.commit()?;
        Ok(())
    }

    /// Pull a modification: the local side is stale (older mtime), so it
    /// diffs against the peer's snapshot and fetches only the changed
    /// chunks via `REQ_CHUNK`.
    pub fn pull_modification(&mut self, local: &FileSnapshot, peer: &FileSnapshot) -> Result<FileSnapshot, Error> {
        let modification = get_file_modification(peer, local);
        if modification.is_empty() {
            return Ok(local.clone());
        }

        let path = self.target(&peer.filename);
        let session = ChunkStoreSession::open(path)?;

        for op in modification.ops.iter() {
            if op.kind == ChunkOpKind::Remove {
                session.write_op(op, &[])?;
                continue;
            }
            self.messenger.send_message(&Message::ReqChunk {
                filename: peer.filename.clone(),
                offset: op.offset,
                chunk_size: op.new_size,
            })?;
            match self.messenger.receive_message()? {
                Message::SendChunk {
                    filename: wire_name,
                    chunk_size,
                    is_last,
                    ..
                } if wire_name == peer.filename && chunk_size == op.new_size => {
                    if !is_last {
                        return Err(state_violation("REQ_CHUNK response must set is_last".to_string()));
                    }
                    let bytes = self.messenger.receive_bytes(chunk_size)?;
                    session.write_op(op, &bytes)?;
                }
                other => return Err(unexpected("SEND_CHUNK", &other)),
            }
        }

        session.commit()?;
        FileSnapshot::scan_file(&self.working_root, &peer.filename)
    }

    /// Serve a `REQ_CHUNK` request from the peer's side.
    pub fn serve_req_chunk(&mut self, filename: &str, offset: u64, chunk_size: u64) -> Result<(), Error> {
        let path = self.target(filename);
        let mut file = File::open(&path).with_context(|| format!("failed to open {:?}", path))?;
        let mut buf = vec![0u8; chunk_size as usize];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        self.messenger.send_message(&Message::SendChunk {
            filename: filename.to_string(),
            chunk_size,
            ordinal: 0,
            is_last: true,
        })?;
        self.messenger.send_bytes(&buf)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // receiver-side application of directory/file mutations
    // ---------------------------------------------------------------

    pub fn apply_dir_create(&self, local: &mut DirSnapshot, path: &str) -> Result<(), Error> {
        fs::create_dir_all(self.target(path))?;
        if !local.dirs.iter().any(|d| d == path) {
            local.dirs.push(path.to_string());
        }
        Ok(())
    }

    pub fn apply_dir_remove(&self, local: &mut DirSnapshot, path: &str) -> Result<(), Error> {
        let full = self.target(path);
        if full.exists() {
            fs::remove_dir_all(&full)
                .with_context(|| format!("failed to remove directory {:?}", full))?;
        }
        local.dirs.retain(|d| d != path);
        local.files.retain(|f, _| !is_under(f, path));
        Ok(())
    }

    pub fn apply_dir_moved(&self, local: &mut DirSnapshot, old: &str, new: &str) -> Result<(), Error> {
        let old_full = self.target(old);
        let new_full = self.target(new);
        if let Some(parent) = new_full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&old_full, &new_full)
            .with_context(|| format!("failed to rename {:?} to {:?}", old_full, new_full))?;

        rekey_dir_moved(local, old, new);
        Ok(())
    }

    pub fn apply_file_create(&self, local: &mut DirSnapshot, filename: &str, mtime: i64) -> Result<(), Error> {
        let path = self.target(filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&path)?;
        local
            .files
            .insert(filename.to_string(), FileSnapshot::empty(filename.to_string(), mtime));
        Ok(())
    }

    pub fn apply_file_remove(&self, local: &mut DirSnapshot, filename: &str) -> Result<(), Error> {
        let path = self.target(filename);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("failed to remove {:?}", path))?;
        }
        local.files.remove(filename);
        Ok(())
    }

    pub fn apply_file_moved(&self, local: &mut DirSnapshot, old: &str, new: &str) -> Result<(), Error> {
        let old_full = self.target(old);
        let new_full = self.target(new);
        if let Some(parent) = new_full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&old_full, &new_full)
            .with_context(|| format!("failed to rename {:?} to {:?}", old_full, new_full))?;
        if let Some(mut snap) = local.files.remove(old) {
            snap.filename = new.to_string();
            local.files.insert(new.to_string(), snap);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // passive-side dispatch loop
    // ---------------------------------------------------------------

    /// Block for one incoming message and act on it: answer introspection
    /// requests from `local`, or apply an inbound mutation to `local` and
    /// disk. Used by the side of the connection that does not drive
    /// reconciliation or its own live-mode pushes - everything it does is a
    /// reaction to something the peer sent.
    pub fn serve_one(&mut self, local: &mut DirSnapshot) -> Result<(), Error> {
        let message = self.messenger.receive_message()?;
        match message {
            Message::ReqSnapVersion => self.serve_snap_version(local),
            Message::ReqSnap => self.serve_snap(local),
            Message::ReqDirList => self.serve_dir_list(local),

            Message::DirCreate { path } => self.apply_dir_create(local, &path),
            Message::DirRemove { path } => self.apply_dir_remove(local, &path),
            Message::DirMoved { old, new } => self.apply_dir_moved(local, &old, &new),
            Message::DirsCreate { paths } => {
                for path in paths.iter() {
                    self.apply_dir_create(local, path)?;
                }
                Ok(())
            }
            Message::DirsRemove { paths } => {
                for path in paths.iter() {
                    self.apply_dir_remove(local, path)?;
                }
                Ok(())
            }

            Message::FileCreate { filename } => {
                self.apply_file_create(local, &filename, current_mtime())
            }
            Message::FileRemove { filename } => self.apply_file_remove(local, &filename),
            Message::FileMoved { old, new } => self.apply_file_moved(local, &old, &new),
            Message::FilesRemove { filenames } => {
                for filename in filenames.iter() {
                    self.apply_file_remove(local, filename)?;
                }
                Ok(())
            }
            Message::FilesCreate { filenames } => {
                for filename in filenames.iter() {
                    match self.messenger.receive_message()? {
                        Message::SendFile {
                            filename: wire_name,
                            file_size,
                            n_chunks,
                        } if &wire_name == filename => {
                            let snap = self.receive_full_file(&wire_name, file_size, n_chunks)?;
                            local.files.insert(snap.filename.clone(), snap);
                        }
                        other => return Err(unexpected("SEND_FILE", &other)),
                    }
                }
                Ok(())
            }

            Message::ModifiedChunk {
                kind,
                filename,
                offset,
                new_size,
                old_size,
                is_last,
            } => {
                self.receive_modified_chunk_stream(
                    filename.clone(),
                    (kind, offset, new_size, old_size, is_last),
                )?;
                let snap = FileSnapshot::scan_file(&self.working_root, &filename)?;
                local.files.insert(snap.filename.clone(), snap);
                Ok(())
            }

            Message::ReqChunk {
                filename,
                offset,
                chunk_size,
            } => self.serve_req_chunk(&filename, offset, chunk_size),

            Message::ReqDownloadFiles { filenames } => self.serve_download_files(&filenames, local),

            // A standalone SEND_FILE, outside a FILES_CREATE batch: the
            // single-file live-create path (FILE_CREATE already applied an
            // empty snapshot entry; this stream fills in its real content).
            Message::SendFile {
                filename,
                file_size,
                n_chunks,
            } => {
                let snap = self.receive_full_file(&filename, file_size, n_chunks)?;
                local.files.insert(snap.filename.clone(), snap);
                Ok(())
            }

            other => Err(unexpected("a driver-initiated request", &other)),
        }
    }
}

fn current_mtime() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn is_under(filename: &str, dir: &str) -> bool {
    filename == dir || filename.starts_with(&format!("{}/", dir))
}

/// Rekey a `DirSnapshot`'s directory and file entries for a directory rename
/// that has already happened on disk (e.g. reported by a filesystem watch),
/// without touching the filesystem itself. `apply_dir_moved` wraps this with
/// the `fs::rename` for the receiving side, where the rename is still
/// pending.
pub fn rekey_dir_moved(local: &mut DirSnapshot, old: &str, new: &str) {
    for d in local.dirs.iter_mut() {
        if let Some(rest) = rewrite_prefix(d, old, new) {
            *d = rest;
        }
    }
    let renamed: Vec<(String, FileSnapshot)> = local
        .files
        .iter()
        .filter_map(|(name, snap)| rewrite_prefix(name, old, new).map(|n| (n, snap.clone())))
        .collect();
    for (name, _) in renamed.iter() {
        local.files.remove(&undo_prefix(name, old, new));
    }
    for (name, mut snap) in renamed {
        snap.filename = name.clone();
        local.files.insert(name, snap);
    }
}

fn rewrite_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if path == old_prefix {
        return Some(new_prefix.to_string());
    }
    let pat = format!("{}/", old_prefix);
    path.strip_prefix(&pat)
        .map(|rest| format!("{}/{}", new_prefix, rest))
}

fn undo_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    if path == new_prefix {
        return old_prefix.to_string();
    }
    let pat = format!("{}/", new_prefix);
    match path.strip_prefix(&pat) {
        Some(rest) => format!("{}/{}", old_prefix, rest),
        None => path.to_string(),
    }
}

fn unexpected(expected_tag: &str, got: &Message) -> Error {
    state_violation(format!("expected {}, got {:?}", expected_tag, got))
}

fn state_violation(reason: String) -> Error {
    Error::from(sync_protocol::ProtocolError::StateViolation(reason))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rewrite_prefix_renames_nested_paths() {
        assert_eq!(
            rewrite_prefix("old/sub/file.txt", "old", "new"),
            Some("new/sub/file.txt".to_string())
        );
        assert_eq!(rewrite_prefix("old", "old", "new"), Some("new".to_string()));
        assert_eq!(rewrite_prefix("other/file.txt", "old", "new"), None);
    }

    #[test]
    fn is_under_matches_self_and_children() {
        assert!(is_under("a", "a"));
        assert!(is_under("a/b", "a"));
        assert!(!is_under("ab", "a"));
    }

    /// `apply_*` never touches the messenger, so a `Cursor` stands in fine
    /// for the socket type parameter in these disk-application tests.
    fn peer_over(root: PathBuf) -> Peer<Cursor<Vec<u8>>> {
        Peer::new(root, Cursor::new(Vec::new()))
    }

    #[test]
    fn apply_dir_create_creates_on_disk_and_records_dir() {
        let dir = tempfile::tempdir().unwrap();
        let peer = peer_over(dir.path().to_path_buf());
        let mut local = DirSnapshot::new();

        peer.apply_dir_create(&mut local, "sub").unwrap();

        assert!(dir.path().join("sub").is_dir());
        assert_eq!(local.dirs, vec!["sub".to_string()]);
    }

    #[test]
    fn apply_dir_remove_purges_files_under_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        let peer = peer_over(dir.path().to_path_buf());

        let mut local = DirSnapshot::new();
        local.dirs.push("sub".to_string());
        local
            .files
            .insert("sub/a.txt".to_string(), FileSnapshot::empty("sub/a.txt".into(), 0));
        local
            .files
            .insert("top.txt".to_string(), FileSnapshot::empty("top.txt".into(), 0));

        peer.apply_dir_remove(&mut local, "sub").unwrap();

        assert!(!dir.path().join("sub").exists());
        assert!(!local.dirs.contains(&"sub".to_string()));
        assert!(!local.files.contains_key("sub/a.txt"));
        assert!(local.files.contains_key("top.txt"));
    }

    #[test]
    fn apply_dir_moved_renames_on_disk_and_rekeys_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("old/nested")).unwrap();
        fs::write(dir.path().join("old/nested/f.txt"), b"hi").unwrap();
        let peer = peer_over(dir.path().to_path_buf());

        let mut local = DirSnapshot::new();
        local.dirs.push("old".to_string());
        local.dirs.push("old/nested".to_string());
        local.files.insert(
            "old/nested/f.txt".to_string(),
            FileSnapshot::empty("old/nested/f.txt".into(), 0),
        );

        peer.apply_dir_moved(&mut local, "old", "new").unwrap();

        assert!(dir.path().join("new/nested/f.txt").exists());
        assert!(!dir.path().join("old").exists());
        assert!(local.dirs.contains(&"new".to_string()));
        assert!(local.dirs.contains(&"new/nested".to_string()));
        assert!(local.files.contains_key("new/nested/f.txt"));
        assert!(!local.files.contains_key("old/nested/f.txt"));
    }

    #[test]
    fn apply_file_create_creates_empty_file_and_snapshot_entry() {
        let dir = tempfile::tempdir().unwrap();
        let peer = peer_over(dir.path().to_path_buf());
        let mut local = DirSnapshot::new();

        peer.apply_file_create(&mut local, "new.txt", 12345).unwrap();

        assert_eq!(fs::metadata(dir.path().join("new.txt")).unwrap().len(), 0);
        assert!(local.files.get("new.txt").is_some());
    }

    #[test]
    fn apply_file_moved_renames_on_disk_and_in_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"content").unwrap();
        let peer = peer_over(dir.path().to_path_buf());

        let mut local = DirSnapshot::new();
        local
            .files
            .insert("a.txt".to_string(), FileSnapshot::empty("a.txt".into(), 0));

        peer.apply_file_moved(&mut local, "a.txt", "b.txt").unwrap();

        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(fs::read(dir.path().join("b.txt")).unwrap(), b"content");
        assert!(!local.files.contains_key("a.txt"));
        assert_eq!(local.files.get("b.txt").unwrap().filename, "b.txt");
    }
}
