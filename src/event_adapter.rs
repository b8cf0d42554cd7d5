//! Converts filesystem notifications into protocol actions (§4.7).
//!
//! Create/modify/delete are forwarded directly. Renames arrive from the
//! underlying watcher as two half-events sharing an opaque "cookie"; we
//! buffer the first half for a short window and pair it with its partner
//! if one shows up, otherwise resolve it to a lone create or delete.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Error;
use log::{debug, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// How long a lone rename half-event waits for its partner before being
/// resolved to a plain create/delete.
const MOVE_PAIR_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncAction {
    FileCreated(String),
    FileRemoved(String),
    FileMoved { old: String, new: String },
    FileModified(String),
    DirCreated(String),
    DirRemoved(String),
    DirMoved { old: String, new: String },
}

struct PendingHalf {
    path: PathBuf,
    is_dir: bool,
    buffered_at: Instant,
}

pub struct EventAdapter {
    root: PathBuf,
    _watcher: RecommendedWatcher,
    rx: crossbeam_channel::Receiver<notify::Result<notify::Event>>,
    pending_from: HashMap<usize, PendingHalf>,
    pending_to: HashMap<usize, PendingHalf>,
}

impl EventAdapter {
    pub fn new(root: PathBuf) -> Result<Self, Error> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            // The watcher's callback thread is the only producer; a full
            // channel here would mean we're not draining fast enough, which
            // unbounded avoids at the cost of unbounded memory under a
            // pathological event storm - acceptable for a sync client.
            let _ = tx.send(res);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        Ok(EventAdapter {
            root,
            _watcher: watcher,
            rx,
            pending_from: HashMap::new(),
            pending_to: HashMap::new(),
        })
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Block until at least one action is ready (or a buffered rename half
    /// times out), then drain everything else already queued, matching the
    /// "blocks on the event source and drains all ready events before
    /// returning" scheduling rule (§5).
    pub fn next_actions(&mut self) -> Result<Vec<SyncAction>, Error> {
        let mut actions = Vec::new();

        let wait = self.next_wait();
        match self.rx.recv_timeout(wait) {
            Ok(event) => self.handle(event, &mut actions),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                anyhow::bail!("filesystem watcher disconnected");
            }
        }

        while let Ok(event) = self.rx.try_recv() {
            self.handle(event, &mut actions);
        }

        self.expire_pending(&mut actions);
        Ok(actions)
    }

    fn next_wait(&self) -> Duration {
        let now = Instant::now();
        self.pending_from
            .values()
            .chain(self.pending_to.values())
            .map(|p| {
                let deadline = p.buffered_at + MOVE_PAIR_TIMEOUT;
                deadline.saturating_duration_since(now)
            })
            .min()
            .unwrap_or(MOVE_PAIR_TIMEOUT)
    }

    fn handle(&mut self, event: notify::Result<notify::Event>, actions: &mut Vec<SyncAction>) {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!("filesystem watcher error: {}", err);
                return;
            }
        };

        if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
            if let [old, new] = event.paths.as_slice() {
                let is_dir = new.is_dir();
                actions.push(self.pair(old.clone(), new.clone(), is_dir));
            } else {
                debug!("rename(Both) event without exactly two paths: {:?}", event.paths);
            }
            return;
        }

        let Some(path) = event.paths.first().cloned() else {
            return;
        };
        let is_dir = path.is_dir();

        match event.kind {
            EventKind::Create(_) => {
                let relative = self.relative(&path);
                actions.push(if is_dir {
                    SyncAction::DirCreated(relative)
                } else {
                    SyncAction::FileCreated(relative)
                });
            }
            EventKind::Remove(_) => {
                let relative = self.relative(&path);
                actions.push(if is_dir {
                    SyncAction::DirRemoved(relative)
                } else {
                    SyncAction::FileRemoved(relative)
                });
            }
            EventKind::Modify(ModifyKind::Data(_)) => {
                if !is_dir {
                    actions.push(SyncAction::FileModified(self.relative(&path)));
                }
            }
            EventKind::Modify(ModifyKind::Name(rename_mode)) => {
                self.handle_rename(rename_mode, path, event.attrs.tracker(), is_dir, actions);
            }
            _ => {
                debug!("ignoring filesystem event {:?}", event.kind);
            }
        }
    }

    fn handle_rename(
        &mut self,
        mode: RenameMode,
        path: PathBuf,
        cookie: Option<usize>,
        is_dir: bool,
        actions: &mut Vec<SyncAction>,
    ) {
        match mode {
            RenameMode::From => {
                let Some(cookie) = cookie else {
                    actions.push(self.lone_from(path, is_dir));
                    return;
                };
                if let Some(to) = self.pending_to.remove(&cookie) {
                    actions.push(self.pair(path, to.path, is_dir));
                } else {
                    self.pending_from.insert(
                        cookie,
                        PendingHalf {
                            path,
                            is_dir,
                            buffered_at: Instant::now(),
                        },
                    );
                }
            }
            RenameMode::To => {
                let Some(cookie) = cookie else {
                    actions.push(self.lone_to(path, is_dir));
                    return;
                };
                if let Some(from) = self.pending_from.remove(&cookie) {
                    actions.push(self.pair(from.path, path, is_dir));
                } else {
                    self.pending_to.insert(
                        cookie,
                        PendingHalf {
                            path,
                            is_dir,
                            buffered_at: Instant::now(),
                        },
                    );
                }
            }
            RenameMode::Both => unreachable!("intercepted in handle() before dispatch"),
            RenameMode::Any | RenameMode::Other => {
                debug!("unspecific rename event for {:?}", path);
            }
        }
    }

    fn pair(&self, old: PathBuf, new: PathBuf, is_dir: bool) -> SyncAction {
        let old = self.relative(&old);
        let new = self.relative(&new);
        if is_dir {
            SyncAction::DirMoved { old, new }
        } else {
            SyncAction::FileMoved { old, new }
        }
    }

    fn lone_from(&self, path: PathBuf, is_dir: bool) -> SyncAction {
        let relative = self.relative(&path);
        if is_dir {
            SyncAction::DirRemoved(relative)
        } else {
            SyncAction::FileRemoved(relative)
        }
    }

    fn lone_to(&self, path: PathBuf, is_dir: bool) -> SyncAction {
        let relative = self.relative(&path);
        if is_dir {
            SyncAction::DirCreated(relative)
        } else {
            SyncAction::FileCreated(relative)
        }
    }

    fn expire_pending(&mut self, actions: &mut Vec<SyncAction>) {
        let now = Instant::now();
        let expired_from: Vec<usize> = self
            .pending_from
            .iter()
            .filter(|(_, p)| now.duration_since(p.buffered_at) >= MOVE_PAIR_TIMEOUT)
            .map(|(&cookie, _)| cookie)
            .collect();
        for cookie in expired_from {
            let half = self.pending_from.remove(&cookie).unwrap();
            actions.push(self.lone_from(half.path, half.is_dir));
        }

        let expired_to: Vec<usize> = self
            .pending_to
            .iter()
            .filter(|(_, p)| now.duration_since(p.buffered_at) >= MOVE_PAIR_TIMEOUT)
            .map(|(&cookie, _)| cookie)
            .collect();
        for cookie in expired_to {
            let half = self.pending_to.remove(&cookie).unwrap();
            actions.push(self.lone_to(half.path, half.is_dir));
        }
    }
}
