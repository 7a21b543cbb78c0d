//! SHA-1 file digests
//!
//! Manifest entries pin downloads with a lowercase hex SHA-1. A present but
//! empty hash string means "no verification requested".

use crate::error::{BootstrapError, Result};
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::Path;

/// Chunk size for reading files during hashing
const CHUNK_SIZE: usize = 64 * 1024;

/// Threshold for showing a spinner while hashing (100MB)
const PROGRESS_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Normalise an optional expected hash. `None` and `""` both mean "don't verify".
pub fn expected_hash(sha1: Option<&str>) -> Option<String> {
    sha1.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// Compute the lowercase hex SHA-1 of a file.
pub fn compute_file_hash(file: &Path) -> Result<String> {
    let mut f = std::fs::File::open(file)?;
    let size = f.metadata().map(|m| m.len()).unwrap_or(0);

    if size > PROGRESS_THRESHOLD {
        let name = file
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        super::progress::with_spinner(&format!("hashing {}", name), || hash_reader(&mut f))
    } else {
        hash_reader(&mut f)
    }
}

fn hash_reader(reader: &mut impl Read) -> Result<String> {
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Whether the file matches `expected` (already normalised).
pub fn file_matches(file: &Path, expected: &str) -> Result<bool> {
    Ok(compute_file_hash(file)? == expected)
}

/// Verify a file against an optional expected digest.
///
/// Returns `VerifyError` on mismatch; does nothing when no digest is given.
pub fn verify_file(file: &Path, sha1: Option<&str>) -> Result<()> {
    let Some(expected) = expected_hash(sha1) else {
        return Ok(());
    };

    let actual = compute_file_hash(file)?;
    if actual != expected {
        return Err(BootstrapError::Verify {
            path: file.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}
