//! End-to-end exercises of one synchronization connection: two `Peer`s
//! talking over a `UnixStream::pair()`, one driving, one serving, each on
//! its own thread and its own working directory.

use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;

use sync_datastore::DirSnapshot;
use synclet::reconciler::{reconcile, Role};
use synclet::session::Peer;

fn write(root: &Path, relative: &str, contents: &[u8]) {
    let full = root.join(relative);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, contents).unwrap();
}

#[test]
fn push_files_create_lands_on_the_serving_side() {
    let sender_root = tempfile::tempdir().unwrap();
    let receiver_root = tempfile::tempdir().unwrap();
    write(sender_root.path(), "a.txt", b"hello delta sync");

    let (a, b) = UnixStream::pair().unwrap();

    let sender_root_path = sender_root.path().to_path_buf();
    let handle = thread::spawn(move || {
        let mut peer = Peer::new(sender_root_path.clone(), a);
        let snap = sync_datastore::FileSnapshot::scan_file(&sender_root_path, "a.txt").unwrap();
        peer.push_files_create(&[snap]).unwrap();
    });

    let mut receiver_peer = Peer::new(receiver_root.path().to_path_buf(), b);
    let mut local = DirSnapshot::new();
    receiver_peer.serve_one(&mut local).unwrap();

    handle.join().unwrap();

    assert!(local.files.contains_key("a.txt"));
    let on_disk = std::fs::read(receiver_root.path().join("a.txt")).unwrap();
    assert_eq!(on_disk, b"hello delta sync");
}

#[test]
fn push_modification_applies_a_middle_edit() {
    let sender_root = tempfile::tempdir().unwrap();
    let receiver_root = tempfile::tempdir().unwrap();

    let original = b"the quick brown fox jumps over the lazy dog".to_vec();
    write(sender_root.path(), "doc.txt", &original);
    write(receiver_root.path(), "doc.txt", &original);

    let before = sync_datastore::FileSnapshot::scan_file(receiver_root.path(), "doc.txt").unwrap();

    let mut edited = original.clone();
    edited[4..9].copy_from_slice(b"slow!");
    write(sender_root.path(), "doc.txt", &edited);
    let after = sync_datastore::FileSnapshot::scan_file(sender_root.path(), "doc.txt").unwrap();

    let modification = sync_datastore::get_file_modification(&after, &before);
    assert!(!modification.is_empty());

    let (a, b) = UnixStream::pair().unwrap();
    let sender_root_path = sender_root.path().to_path_buf();
    let modification_clone = modification.clone();
    let handle = thread::spawn(move || {
        let mut peer = Peer::new(sender_root_path, a);
        peer.push_modification("doc.txt", &modification_clone).unwrap();
    });

    let mut receiver_peer = Peer::new(receiver_root.path().to_path_buf(), b);
    let mut local = DirSnapshot::new();
    local.files.insert("doc.txt".to_string(), before);
    receiver_peer.serve_one(&mut local).unwrap();
    handle.join().unwrap();

    let on_disk = std::fs::read(receiver_root.path().join("doc.txt")).unwrap();
    assert_eq!(on_disk, edited);
}

#[test]
fn pull_modification_fetches_only_changed_chunks() {
    let stale_root = tempfile::tempdir().unwrap();
    let fresh_root = tempfile::tempdir().unwrap();

    let original = b"0123456789abcdefghijklmnopqrstuvwxyz".to_vec();
    write(stale_root.path(), "f.bin", &original);

    let mut edited = original.clone();
    edited.extend_from_slice(b"-appended-tail");
    write(fresh_root.path(), "f.bin", &edited);

    let local_snap = sync_datastore::FileSnapshot::scan_file(stale_root.path(), "f.bin").unwrap();
    let peer_snap = sync_datastore::FileSnapshot::scan_file(fresh_root.path(), "f.bin").unwrap();

    let (a, b) = UnixStream::pair().unwrap();
    let fresh_root_path = fresh_root.path().to_path_buf();
    let peer_snap_clone = peer_snap.clone();
    let handle = thread::spawn(move || {
        let mut serving = Peer::new(fresh_root_path.clone(), a);
        loop {
            match serving.serve_one(&mut DirSnapshot::new()) {
                Ok(()) => continue,
                Err(_) => break,
            }
        }
    });

    let mut pulling = Peer::new(stale_root.path().to_path_buf(), b);
    let result = pulling.pull_modification(&local_snap, &peer_snap_clone).unwrap();
    drop(pulling);
    handle.join().ok();

    assert_eq!(result.file_size, edited.len() as u64);
    let on_disk = std::fs::read(stale_root.path().join("f.bin")).unwrap();
    assert_eq!(on_disk, edited);
}

#[test]
fn reconcile_converges_a_brand_new_file_from_sender_to_receiver() {
    let sender_root = tempfile::tempdir().unwrap();
    let receiver_root = tempfile::tempdir().unwrap();
    write(sender_root.path(), "only_on_sender.txt", b"content only the sender has");

    let (a, b) = UnixStream::pair().unwrap();

    let receiver_root_path = receiver_root.path().to_path_buf();
    let handle = thread::spawn(move || {
        let mut peer = Peer::new(receiver_root_path.clone(), b);
        let mut local = DirSnapshot::scan(&receiver_root_path).unwrap();
        loop {
            match peer.serve_one(&mut local) {
                Ok(()) => continue,
                Err(_) => break,
            }
        }
        local
    });

    let sender_root_path = sender_root.path().to_path_buf();
    let mut peer = Peer::new(sender_root_path.clone(), a);
    let curr = DirSnapshot::scan(&sender_root_path).unwrap();
    let converged = reconcile(&mut peer, Role::Sender, curr, None).unwrap();
    drop(peer);

    let receiver_local = handle.join().unwrap();

    assert!(converged.files.contains_key("only_on_sender.txt"));
    assert!(receiver_root.path().join("only_on_sender.txt").exists());
    let on_disk = std::fs::read(receiver_root.path().join("only_on_sender.txt")).unwrap();
    assert_eq!(on_disk, b"content only the sender has");
}
