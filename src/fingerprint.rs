//! Content fingerprints for duplicate detection.
//!
//! Files are streamed through BLAKE3 in fixed-size chunks so memory use stays flat
//! regardless of file size.
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Size of each read when hashing a file.
pub const CHUNK_SIZE: usize = 4096;

/// Fixed-size digest of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(blake3::Hash);

impl Digest {
    /// Digest of an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(blake3::hash(data))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// Computes the content digest of the file at `path`.
///
/// Returns an error if the file cannot be opened or read; callers treat that as
/// "duplicate status unknown" rather than a failure of the surrounding operation.
pub fn fingerprint(path: &Path) -> io::Result<Digest> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(Digest(hasher.finalize()))
}
