//! File system helper utilities.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};

/// Create `dir` (and parents) if it does not already exist.
pub fn ensure_dir(dir: &Path) -> Result<(), Error> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to create directory {:?}", dir)),
    }
}

/// Replace `target` with `incoming`, both full paths, via rename. The two
/// paths must live on the same file system for the rename to be atomic; the
/// chunk store always creates its `.incoming` temp file next to the target
/// for this reason.
pub fn atomic_replace(incoming: &Path, target: &Path) -> Result<(), Error> {
    fs::rename(incoming, target)
        .with_context(|| format!("failed to rename {:?} to {:?}", incoming, target))?;
    Ok(())
}

/// Copy exactly `count` bytes from `src` to `dst`, failing if `src` runs dry
/// before `count` bytes have been produced.
pub fn copy_exact(src: &mut dyn Read, dst: &mut dyn Write, count: u64) -> Result<(), Error> {
    let mut remaining = count;
    let mut buffer = [0u8; 64 * 1024];

    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        match src.read(&mut buffer[..want]) {
            Ok(0) => bail!("unexpected EOF, {} bytes still pending", remaining),
            Ok(got) => {
                dst.write_all(&buffer[..got])?;
                remaining -= got as u64;
            }
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

/// Open `path` for append, creating it if necessary. Used for chunk-store
/// scratch files and the `.incoming` finalize target.
pub fn open_append(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {:?} for append", path))
}

/// Best-effort recursive removal; errors are logged by the caller, never
/// fatal on their own since the scratch directory may already be gone.
pub fn remove_dir_all_lenient(dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir) {
        if err.kind() != io::ErrorKind::NotFound {
            log::warn!("failed to remove scratch directory {:?}: {}", dir, err);
        }
    }
}

/// Build the scratch-directory path for a file's chunk store session:
/// `<relative_filename>_dir` beside the target file.
pub fn scratch_dir_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push("_dir");
    PathBuf::from(name)
}

/// Build the `.incoming` temp-file path used during finalize.
pub fn incoming_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".incoming");
    PathBuf::from(name)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn copy_exact_copies_requested_bytes() {
        let mut src = Cursor::new(b"hello world".to_vec());
        let mut dst = Vec::new();
        copy_exact(&mut src, &mut dst, 5).unwrap();
        assert_eq!(dst, b"hello");
    }

    #[test]
    fn copy_exact_fails_on_short_source() {
        let mut src = Cursor::new(b"hi".to_vec());
        let mut dst = Vec::new();
        assert!(copy_exact(&mut src, &mut dst, 10).is_err());
    }

    #[test]
    fn scratch_dir_naming() {
        let target = Path::new("/data/work/a.txt");
        assert_eq!(
            scratch_dir_for(target),
            PathBuf::from("/data/work/a.txt_dir")
        );
        assert_eq!(
            incoming_path_for(target),
            PathBuf::from("/data/work/a.txt.incoming")
        );
    }
}
