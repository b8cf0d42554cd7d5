//! Content-defined chunking via a polynomial rolling hash.
//!
//! Unlike a fixed-size split, boundaries here are a function of the bytes
//! themselves, so a local edit only ever perturbs the chunks that actually
//! overlap it - everything before and after resyncs at the next boundary.

use std::collections::VecDeque;
use std::io::Read;

use anyhow::Error;
use sync_tools::digest;

const BASE: u64 = 256;
const MODULUS: u64 = 1_000_000_007;

/// One content-defined chunk as produced by a scan, before it is wrapped
/// into a `ChunkInfo` with its ordinal assigned.
pub struct ChunkBoundary {
    pub offset: u64,
    pub size: u64,
    pub digest: [u8; 32],
}

/// Derive the rolling-hash window size `W` and divisor `N` from a file size,
/// per the fixed clamp/derivation rule.
pub fn derive_params(file_size: u64) -> (usize, u64) {
    let w = (file_size / 1_000_000).clamp(32, 128) as usize;
    let n = std::cmp::max(2048, file_size / (512 * 1024));
    (w, n)
}

/// Incremental rolling-hash boundary detector. Feeding it byte-by-byte or in
/// bulk via [`Chunker::scan`] must produce identical boundaries.
pub struct Chunker {
    w: usize,
    n: u64,
    b_pow_w1: u64,
    window: VecDeque<u8>,
    h: u64,
}

impl Chunker {
    pub fn new(file_size: u64) -> Self {
        let (w, n) = derive_params(file_size);
        let mut b_pow_w1 = 1u64;
        for _ in 0..w.saturating_sub(1) {
            b_pow_w1 = (b_pow_w1 * BASE) % MODULUS;
        }
        Chunker {
            w,
            n,
            b_pow_w1,
            window: VecDeque::with_capacity(w),
            h: 0,
        }
    }

    /// Feed a single byte. Returns `true` iff, immediately after accepting
    /// this byte, the window is full and the boundary test fires - in which
    /// case the window and hash are reset and the caller should start a new
    /// chunk at the following byte.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.window.len() == self.w {
            let c_out = self.window.pop_front().expect("window at capacity");
            let leaving = (c_out as u64 * self.b_pow_w1) % MODULUS;
            self.h = (self.h + MODULUS - leaving) % MODULUS;
        }
        self.window.push_back(byte);
        self.h = (self.h * BASE + byte as u64) % MODULUS;

        if self.window.len() == self.w && self.h % self.n == 0 {
            self.window.clear();
            self.h = 0;
            true
        } else {
            false
        }
    }

    /// Feed a buffer starting at its beginning. Returns the number of bytes
    /// consumed before a boundary fired (the boundary byte is included in
    /// the count), or `None` if the whole buffer was consumed without one.
    pub fn scan(&mut self, data: &[u8]) -> Option<usize> {
        for (i, &byte) in data.iter().enumerate() {
            if self.push(byte) {
                return Some(i + 1);
            }
        }
        None
    }
}

/// Scan a whole byte stream into content-defined chunk boundaries, given its
/// total size up front (so `W`/`N` can be derived once).
pub fn scan_reader(file_size: u64, reader: &mut dyn Read) -> Result<Vec<ChunkBoundary>, Error> {
    let mut chunker = Chunker::new(file_size);
    let mut chunks = Vec::new();

    let mut buffer = [0u8; 64 * 1024];
    let mut offset: u64 = 0;
    let mut chunk_start: u64 = 0;
    let mut hasher = openssl::sha::Sha256::new();

    loop {
        let got = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(got) => got,
            Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };

        let mut consumed = 0;
        while consumed < got {
            match chunker.scan(&buffer[consumed..got]) {
                Some(n) => {
                    hasher.update(&buffer[consumed..consumed + n]);
                    let digest = hasher.finish();
                    hasher = openssl::sha::Sha256::new();
                    let end = offset + (consumed as u64) + n as u64;
                    chunks.push(ChunkBoundary {
                        offset: chunk_start,
                        size: end - chunk_start,
                        digest,
                    });
                    chunk_start = end;
                    consumed += n;
                }
                None => {
                    hasher.update(&buffer[consumed..got]);
                    consumed = got;
                }
            }
        }
        offset += got as u64;
    }

    if offset > chunk_start {
        chunks.push(ChunkBoundary {
            offset: chunk_start,
            size: offset - chunk_start,
            digest: hasher.finish(),
        });
    }

    Ok(chunks)
}

/// Convenience wrapper taking an in-memory byte slice.
pub fn scan_bytes(data: &[u8]) -> Result<Vec<ChunkBoundary>, Error> {
    let mut cursor = std::io::Cursor::new(data);
    scan_reader(data.len() as u64, &mut cursor)
}

#[allow(dead_code)]
fn hex_of(boundary: &ChunkBoundary) -> String {
    digest::hex_digest(&boundary.digest)
}
