//! Checksum helpers.
//!
//! MD5 is what the published known-good results for MerkurNewton are
//! recorded in; SHA-256 fingerprints every collected file in the run report.

use fs_err as fs;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// MD5 of a file, read in chunks.
pub fn md5_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    digest_file::<Md5>(path.as_ref())
}

pub fn sha256_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    digest_file::<Sha256>(path.as_ref())
}

fn digest_file<D: Digest>(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = D::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare two hex digests ignoring case and surrounding whitespace.
pub fn digest_eq(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
