//! Drives one side of a synchronization session: connects to a peer,
//! reconciles to a matching snapshot, then watches the local directory and
//! pushes whatever changes occur.

use std::net::TcpStream;
use std::path::PathBuf;

use anyhow::{Context, Error};
use log::{error, info, warn};

use sync_datastore::{get_file_modification, DirSnapshot, FileSnapshot};
use synclet::session::rekey_dir_moved;
use synclet::{event_adapter::SyncAction, reconcile, EventAdapter, Peer, Role, SnapshotStore};

fn working_root() -> PathBuf {
    std::env::var(sync_buildcfg::WORKING_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn peer_addr() -> String {
    std::env::var(sync_buildcfg::PEER_ADDR_ENV)
        .unwrap_or_else(|_| format!("127.0.0.1:{}", sync_buildcfg::DEFAULT_PORT))
}

fn cache_path() -> PathBuf {
    std::env::var(sync_buildcfg::DATA_DIR_ENV)
        .map(|dir| PathBuf::from(dir).join(sync_buildcfg::PEER_SNAP_FILE_NAME))
        .unwrap_or_else(|_| PathBuf::from(sync_buildcfg::PEER_SNAP_FILE))
}

fn main() -> Result<(), Error> {
    env_logger::init();
    let cancel = synclet::install_signal_handler()?;

    let root = working_root();
    let addr = peer_addr();
    info!("connecting to {} (root {:?})", addr, root);
    let socket = TcpStream::connect(&addr).with_context(|| format!("failed to connect to {}", addr))?;

    let cache_store = SnapshotStore::new(cache_path());
    let peer_cache = cache_store.load()?;

    let mut curr = DirSnapshot::scan(&root)?;
    curr.reindex();

    let mut peer = Peer::new(root.clone(), socket);
    let mut local = reconcile(&mut peer, Role::Sender, curr, peer_cache)?;
    cache_store.save(&local)?;
    info!("converged, fingerprint {}", local.fingerprint());

    let mut watcher = EventAdapter::new(root.clone())?;
    info!("watching {:?} for changes", root);

    while !cancel.is_cancelled() {
        let actions = match watcher.next_actions() {
            Ok(actions) => actions,
            Err(err) => {
                error!("event adapter failed: {}", err);
                break;
            }
        };
        for action in actions {
            if let Err(err) = apply_action(&mut peer, &root, &mut local, action) {
                warn!("failed to propagate local change: {}", err);
            }
        }
    }

    cache_store.save(&local)?;
    info!("shutting down");
    Ok(())
}

fn apply_action(
    peer: &mut Peer<TcpStream>,
    root: &std::path::Path,
    local: &mut DirSnapshot,
    action: SyncAction,
) -> Result<(), Error> {
    match action {
        SyncAction::DirCreated(path) => {
            if !local.dirs.iter().any(|d| d == &path) {
                local.dirs.push(path.clone());
            }
            peer.send_dir_create(&path)
        }
        SyncAction::DirRemoved(path) => {
            local.dirs.retain(|d| d != &path);
            peer.send_dir_remove(&path)
        }
        SyncAction::DirMoved { old, new } => {
            // The move already happened on disk (that's what the watcher
            // reported); only the in-memory bookkeeping needs rekeying.
            rekey_dir_moved(local, &old, &new);
            peer.send_dir_moved(&old, &new)
        }
        SyncAction::FileCreated(filename) => {
            let snap = FileSnapshot::scan_file(root, &filename)?;
            local.files.insert(snap.filename.clone(), snap.clone());
            peer.push_file_create(&snap)
        }
        SyncAction::FileRemoved(filename) => {
            local.files.remove(&filename);
            peer.send_file_remove(&filename)
        }
        SyncAction::FileMoved { old, new } => {
            if let Some(mut snap) = local.files.remove(&old) {
                snap.filename = new.clone();
                local.files.insert(new.clone(), snap);
            }
            peer.send_file_moved(&old, &new)
        }
        SyncAction::FileModified(filename) => {
            let fresh = FileSnapshot::scan_file(root, &filename)?;
            let previous = local
                .files
                .get(&filename)
                .cloned()
                .unwrap_or_else(|| FileSnapshot::empty(filename.clone(), fresh.mtime));
            let modification = get_file_modification(&fresh, &previous);
            if !modification.is_empty() {
                peer.push_modification(&filename, &modification)?;
            }
            local.files.insert(filename, fresh);
            Ok(())
        }
    }
}
