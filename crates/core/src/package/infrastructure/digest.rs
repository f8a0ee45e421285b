use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::shared::constants::DIGEST_CHUNK_SIZE;

/// Base64 SHA-1 of a file, as packing lists record it.
///
/// `progress` is called after each chunk with `(bytes_done, bytes_total)`.
pub fn file_digest(path: &Path, progress: &mut dyn FnMut(u64, u64)) -> io::Result<String> {
    let mut file = File::open(path)?;
    let total = file.metadata()?.len();
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];
    let mut done: u64 = 0;

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        done += n as u64;
        progress(done, total);
    }

    Ok(STANDARD.encode(hasher.finalize()))
}

/// Base64 SHA-1 of an in-memory document.
pub fn bytes_digest(bytes: &[u8]) -> String {
    STANDARD.encode(Sha1::digest(bytes))
}

/// Lowercase hex SHA-1, used for per-frame records.
pub fn hex_sha1(bytes: &[u8]) -> String {
    Sha1::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_digest_known_value() {
        // SHA-1("abc") = a9993e36 4706816a ba3e2571 7850c26c 9cd0d89d
        assert_eq!(bytes_digest(b"abc"), "qZk+NkcGgWq6PiVxeFDCbJzQ2J0=");
        assert_eq!(hex_sha1(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_file_digest_matches_bytes_digest_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asset.mxf");
        let data = vec![7u8; DIGEST_CHUNK_SIZE + 10];
        std::fs::write(&path, &data).unwrap();

        let mut calls = Vec::new();
        let digest = file_digest(&path, &mut |done, total| calls.push((done, total))).unwrap();

        assert_eq!(digest, bytes_digest(&data));
        assert_eq!(calls.last(), Some(&(data.len() as u64, data.len() as u64)));
        assert!(calls.len() >= 2);
    }

    #[test]
    fn test_file_digest_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_digest(&dir.path().join("none"), &mut |_, _| {}).is_err());
    }
}
