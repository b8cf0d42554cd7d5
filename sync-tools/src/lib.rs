//! Small helpers shared by `sync-datastore`, `sync-protocol` and the
//! `synclet` binaries. Kept dependency-light on purpose.

pub mod digest;
pub mod fs;
