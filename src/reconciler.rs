//! Initial convergence (§4.6): runs once after connection establishment,
//! before the live watch loop starts, and brings both peers to equal
//! `DirSnapshot` fingerprints.

use std::io::{Read, Write};

use anyhow::{bail, Error};
use log::{debug, info};

use sync_datastore::{compare_snapshots, DirSnapshot};

use crate::session::Peer;

/// Which CLI this process is running as. Only used to break a modification
/// tie (equal mtimes on both sides) deterministically: the sender always
/// pushes on a tie, the receiver always fetches, so the two processes never
/// both decide to push (or both decide to pull) the same file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

pub fn reconcile<S>(
    peer: &mut Peer<S>,
    role: Role,
    curr: DirSnapshot,
    peer_cache: Option<DirSnapshot>,
) -> Result<DirSnapshot, Error>
where
    S: Read + Write,
{
    let local_fingerprint = curr.fingerprint();
    let fetched_fingerprint = peer.request_snap_version()?;

    if fetched_fingerprint == local_fingerprint {
        info!("already converged (fingerprint {})", local_fingerprint);
        return Ok(curr);
    }

    let was_peer_cache_current = peer_cache
        .as_ref()
        .map(|c| c.fingerprint() == fetched_fingerprint)
        .unwrap_or(false);

    let peer_snapshot = if was_peer_cache_current {
        debug!("peer cache is current, reusing it instead of REQ_SNAP/REQ_DIR_LIST");
        peer_cache.expect("was_peer_cache_current implies peer_cache is Some")
    } else {
        debug!("peer cache stale or absent, fetching full snapshot");
        let files = peer.request_snap()?;
        let dirs = peer.request_dir_list()?;
        let mut snap = DirSnapshot {
            files: files.into_iter().map(|f| (f.filename.clone(), f)).collect(),
            dirs,
        };
        snap.reindex();
        snap
    };

    let changes = compare_snapshots(&curr, &peer_snapshot);
    let mut local = curr.clone();

    if !changes.added_dirs.is_empty() {
        if was_peer_cache_current {
            info!("pushing {} new director{}", changes.added_dirs.len(), plural(changes.added_dirs.len()));
            peer.send_dirs_create(&changes.added_dirs)?;
        } else {
            for d in changes.added_dirs.iter() {
                peer.apply_dir_remove(&mut local, d)?;
            }
        }
    }

    if !changes.removed_dirs.is_empty() {
        if was_peer_cache_current {
            peer.send_dirs_remove(&changes.removed_dirs)?;
        } else {
            for d in changes.removed_dirs.iter() {
                peer.apply_dir_create(&mut local, d)?;
            }
        }
    }

    if !changes.created_files.is_empty() {
        info!("pushing {} created file(s)", changes.created_files.len());
        peer.push_files_create(&changes.created_files)?;
    }

    if !changes.removed_files.is_empty() {
        if was_peer_cache_current {
            peer.send_files_remove(&changes.removed_files)?;
        } else {
            info!("pulling {} file(s) missing locally", changes.removed_files.len());
            let pulled = peer.request_download_files(&changes.removed_files)?;
            for snap in pulled {
                local.files.insert(snap.filename.clone(), snap);
            }
        }
    }

    for modification in changes.modified_files.iter() {
        let local_snap = local
            .files
            .get(&modification.filename)
            .expect("modified file present locally")
            .clone();
        let peer_snap = peer_snapshot
            .files
            .get(&modification.filename)
            .expect("modified file present on peer");

        let local_is_newer = match local_snap.mtime.cmp(&peer_snap.mtime) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => role == Role::Sender,
        };

        if local_is_newer {
            debug!("pushing modification for {}", modification.filename);
            peer.push_modification(&modification.filename, modification)?;
        } else {
            debug!("pulling modification for {}", modification.filename);
            let new_snap = peer.pull_modification(&local_snap, peer_snap)?;
            local.files.insert(new_snap.filename.clone(), new_snap);
        }
    }

    local.reindex();

    let converged_fingerprint = local.fingerprint();
    let peer_fingerprint_after = peer.request_snap_version()?;
    if peer_fingerprint_after != converged_fingerprint {
        bail!(
            "convergence check failed: local fingerprint {} != peer fingerprint {} after reconcile",
            converged_fingerprint,
            peer_fingerprint_after
        );
    }

    Ok(local)
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
