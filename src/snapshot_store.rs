//! Persist and load the last-synced peer snapshot cache (§6: "a text file at
//! a configured path containing a version string, a list of files with
//! their chunks... Format is not required to be stable across
//! implementations; only the ability to round-trip the in-memory
//! `DirSnapshot` is required.").

use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use sync_datastore::DirSnapshot;

/// On-disk envelope: a format version tag plus the snapshot itself, so a
/// future incompatible change can be detected instead of silently
/// misparsed.
#[derive(serde::Serialize, serde::Deserialize)]
struct SnapshotFile {
    version: u32,
    snapshot: DirSnapshot,
}

const FORMAT_VERSION: u32 = 1;

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        SnapshotStore { path }
    }

    /// Absent on first run - this is not an error.
    pub fn load(&self) -> Result<Option<DirSnapshot>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read peer snapshot cache {:?}", self.path))?;
        let file: SnapshotFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse peer snapshot cache {:?}", self.path))?;
        let mut snapshot = file.snapshot;
        snapshot.reindex();
        Ok(Some(snapshot))
    }

    /// Write `snapshot` atomically: a sibling temp file, then rename over
    /// the target, so a crash mid-write never corrupts the last-good cache.
    pub fn save(&self, snapshot: &DirSnapshot) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            sync_tools::fs::ensure_dir(parent)?;
        }
        let file = SnapshotFile {
            version: FORMAT_VERSION,
            snapshot: snapshot.clone(),
        };
        let encoded = serde_json::to_string(&file)?;

        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, encoded)
            .with_context(|| format!("failed to write {:?}", tmp_path))?;
        sync_tools::fs::atomic_replace(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
