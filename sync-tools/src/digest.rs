//! Content digest helpers.
//!
//! The engine uses SHA-256 everywhere a "cryptographic, collision-resistant,
//! 256-bit hash" is called for: per-chunk digests and directory version
//! fingerprints alike.

use std::io::Read;

use anyhow::Error;

/// Hash the full contents of `reader`, returning the raw digest bytes.
pub fn sha256_reader(reader: &mut dyn Read) -> Result<[u8; 32], Error> {
    let mut hasher = openssl::sha::Sha256::new();
    let mut buffer = [0u8; 256 * 1024];

    loop {
        let count = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(count) => count,
            Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        hasher.update(&buffer[..count]);
    }

    Ok(hasher.finish())
}

/// Hash a byte slice in one shot.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = openssl::sha::Sha256::new();
    hasher.update(data);
    hasher.finish()
}

/// Lowercase hex encoding, as required everywhere digests cross the wire or
/// hit the snapshot cache.
pub fn hex_digest(raw: &[u8; 32]) -> String {
    hex::encode(raw)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_input_has_stable_digest() {
        let d1 = sha256_bytes(b"");
        let d2 = sha256_bytes(b"");
        assert_eq!(d1, d2);
        assert_eq!(
            hex_digest(&d1),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn reader_and_bytes_agree() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut cursor = std::io::Cursor::new(&data[..]);
        let by_reader = sha256_reader(&mut cursor).unwrap();
        let by_bytes = sha256_bytes(data);
        assert_eq!(by_reader, by_bytes);
    }
}
