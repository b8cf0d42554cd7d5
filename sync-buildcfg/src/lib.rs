//! Compiled-in configuration constants for synclet.
//!
//! Mirrors the `pbs-buildcfg` pattern: plain `pub const`s plus
//! `concat!`-based macros for building derived paths, so that defaults are
//! baked into the binary and only need an environment variable to override.

/// Default TCP port both `sync-sender` and `sync-receiver` listen on / dial.
pub const DEFAULT_PORT: u16 = 9000;

/// Default data directory holding the persisted peer snapshot cache.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/synclet";

/// Environment variable overriding the working directory to synchronize.
pub const WORKING_ROOT_ENV: &str = "SYNC_WORKDIR";

/// Environment variable overriding the peer address (`host:port`) to dial.
pub const PEER_ADDR_ENV: &str = "SYNC_PEER_ADDR";

/// Environment variable overriding the local listen/connect port.
pub const PORT_ENV: &str = "SYNC_PORT";

/// Environment variable overriding `DEFAULT_DATA_DIR`.
pub const DATA_DIR_ENV: &str = "SYNC_DATA_DIR";

#[macro_export]
macro_rules! data_dir {
    ($subdir:expr) => {
        concat!("/var/lib/synclet", $subdir)
    };
}

/// Filename, relative to the data dir, of the persisted peer snapshot cache.
pub const PEER_SNAP_FILE_NAME: &str = "peer-snapshot.json";

/// Compiled-in default path to the persisted peer snapshot cache.
pub const PEER_SNAP_FILE: &str = data_dir!("/peer-snapshot.json");
