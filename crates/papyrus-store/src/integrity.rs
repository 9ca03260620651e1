// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backing-file fingerprints — SHA-256, recorded per document version.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use papyrus_core::error::Result;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Stream the file at `path` through SHA-256.
///
/// Returns the file size in bytes together with the hex digest.
pub fn hash_file(path: impl AsRef<Path>) -> Result<(u64, String)> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        size += read as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SHA-256 of the empty byte slice (well-known constant).
    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hash_empty_input() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
    }

    #[test]
    fn file_hash_matches_byte_hash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.pdf");
        let data = vec![7u8; 200_000];
        std::fs::write(&path, &data).expect("write");

        let (size, digest) = hash_file(&path).expect("hash");
        assert_eq!(size, 200_000);
        assert_eq!(digest, hash_bytes(&data));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(hash_file("/nonexistent/papyrus/doc.pdf").is_err());
    }
}
